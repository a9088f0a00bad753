//! Phase-ordered composition of policies around a transport call.
//!
//! Policies are added with ordering hints ([`AddPolicyOptions`]). The first
//! time a pipeline runs it resolves the hints into a single order and caches
//! it until the policy set changes.
//!
//! ```text
//! Serialize -> (unphased) -> Deserialize -> Retry -> Sign -> transport
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::error::{RestError, RestResult};
use crate::request::Request;
use crate::response::Response;
use crate::transport::HttpClient;

/// A named stage in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Serialize,
    Deserialize,
    Retry,
    Sign,
}

/// Ordering hints supplied when a policy is added.
#[derive(Debug, Clone, Default)]
pub struct AddPolicyOptions {
    /// Names of policies this one must run before.
    pub before_policies: Vec<String>,
    /// Names of policies this one must run after.
    pub after_policies: Vec<String>,
    /// Phase the policy belongs to. `None` is the unphased slot.
    pub phase: Option<Phase>,
    /// Run only after every policy of this phase has been scheduled.
    pub after_phase: Option<Phase>,
}

impl AddPolicyOptions {
    pub fn in_phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }

    pub fn after_phase(phase: Phase) -> Self {
        Self {
            after_phase: Some(phase),
            ..Self::default()
        }
    }

    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before_policies.push(name.into());
        self
    }

    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after_policies.push(name.into());
        self
    }
}

/// Selects the policies removed by [`Pipeline::remove_policy`].
#[derive(Debug, Clone, Default)]
pub struct RemovePolicyOptions {
    pub name: Option<String>,
    pub phase: Option<Phase>,
}

/// A unit of middleware in the pipeline.
///
/// A policy receives the request and the continuation to the rest of the
/// pipeline. It may mutate the request, call `next.run` zero or more times,
/// and inspect or replace the response.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Unique name of this policy within a pipeline.
    fn name(&self) -> &str;

    async fn send_request(&self, request: &mut Request, next: Next<'_>) -> RestResult<Response>;
}

/// The continuation handed to each [`Policy`].
#[derive(Clone, Copy)]
pub struct Next<'a> {
    policies: &'a [Arc<dyn Policy>],
    http_client: &'a dyn HttpClient,
}

impl<'a> Next<'a> {
    pub fn new(policies: &'a [Arc<dyn Policy>], http_client: &'a dyn HttpClient) -> Self {
        Self {
            policies,
            http_client,
        }
    }

    /// Run the remaining policies and, after them, the transport.
    pub async fn run(self, request: &mut Request) -> RestResult<Response> {
        match self.policies.split_first() {
            Some((policy, rest)) => {
                let next = Next {
                    policies: rest,
                    http_client: self.http_client,
                };
                policy.send_request(request, next).await
            }
            None => dispatch(self.http_client, request).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.policies.len())
            .finish()
    }
}

fn aborted(request: &Request) -> RestError {
    RestError::cancelled("The operation was aborted.").with_request(request.info())
}

/// Terminal step: the transport call, bounded by timeout and abort signal.
async fn dispatch(http_client: &dyn HttpClient, request: &mut Request) -> RestResult<Response> {
    if request.is_cancelled() {
        return Err(aborted(request));
    }
    let request: &Request = request;
    let send = async {
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, http_client.send_request(request))
                .await
                .map_err(|_| {
                    RestError::timeout(format!(
                        "Request timed out after {} ms",
                        limit.as_millis()
                    ))
                    .with_request(request.info())
                })?,
            None => http_client.send_request(request).await,
        }
    };
    match &request.abort_signal {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(aborted(request)),
                result = send => result,
            }
        }
        None => send.await,
    }
}

#[derive(Clone)]
struct PolicyDescriptor {
    policy: Arc<dyn Policy>,
    options: AddPolicyOptions,
}

type OrderedPolicies = Arc<[Arc<dyn Policy>]>;

/// An ordered set of policies that can send requests.
///
/// Built once per client and shared; mutation requires exclusive access.
#[derive(Default)]
pub struct Pipeline {
    policies: Vec<PolicyDescriptor>,
    ordered: OnceLock<Result<OrderedPolicies, RestError>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a policy with ordering hints.
    ///
    /// Fails when the name is already taken or when both `phase` and
    /// `after_phase` are given.
    pub fn add_policy(
        &mut self,
        policy: Arc<dyn Policy>,
        options: AddPolicyOptions,
    ) -> RestResult<()> {
        if options.phase.is_some() && options.after_phase.is_some() {
            return Err(RestError::configuration(
                "Policies inside a phase cannot specify after_phase.",
            ));
        }
        if self
            .policies
            .iter()
            .any(|existing| existing.policy.name() == policy.name())
        {
            return Err(RestError::configuration(format!(
                "Duplicate policy names not allowed in pipeline: {}",
                policy.name()
            )));
        }
        self.policies.push(PolicyDescriptor { policy, options });
        self.ordered = OnceLock::new();
        Ok(())
    }

    /// Remove every policy matching the given name or phase.
    pub fn remove_policy(&mut self, options: &RemovePolicyOptions) -> Vec<Arc<dyn Policy>> {
        let mut removed = Vec::new();
        self.policies.retain(|descriptor| {
            let by_name = options
                .name
                .as_deref()
                .is_some_and(|name| descriptor.policy.name() == name);
            let by_phase = options.phase.is_some() && descriptor.options.phase == options.phase;
            if by_name || by_phase {
                removed.push(Arc::clone(&descriptor.policy));
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.ordered = OnceLock::new();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn resolved(&self) -> RestResult<OrderedPolicies> {
        self.ordered
            .get_or_init(|| order_policies(&self.policies).map(Arc::from))
            .clone()
    }

    /// The policies in execution order.
    pub fn ordered_policies(&self) -> RestResult<Vec<Arc<dyn Policy>>> {
        Ok(self.resolved()?.to_vec())
    }

    /// Send a request through every policy and then the transport.
    pub async fn send_request(
        &self,
        http_client: &dyn HttpClient,
        request: &mut Request,
    ) -> RestResult<Response> {
        let ordered = self.resolved()?;
        Next::new(&ordered, http_client).run(request).await
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            ordered: OnceLock::new(),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|d| d.policy.name()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

const SERIALIZE: usize = 0;
const NO_PHASE: usize = 1;
const DESERIALIZE: usize = 2;
const RETRY: usize = 3;
const SIGN: usize = 4;

fn phase_slot(phase: Option<Phase>) -> usize {
    match phase {
        Some(Phase::Serialize) => SERIALIZE,
        None => NO_PHASE,
        Some(Phase::Deserialize) => DESERIALIZE,
        Some(Phase::Retry) => RETRY,
        Some(Phase::Sign) => SIGN,
    }
}

struct Node {
    depends_on: BTreeSet<usize>,
    dependants: BTreeSet<usize>,
    after_phase: Option<usize>,
}

#[derive(Default)]
struct PhaseSlot {
    members: Vec<usize>,
    has_run: bool,
    has_after_policies: bool,
}

struct PolicyGraph {
    nodes: Vec<Node>,
    phases: [PhaseSlot; 5],
    result: Vec<usize>,
}

impl PolicyGraph {
    fn build(descriptors: &[PolicyDescriptor]) -> RestResult<Self> {
        let mut graph = PolicyGraph {
            nodes: Vec::with_capacity(descriptors.len()),
            phases: Default::default(),
            result: Vec::with_capacity(descriptors.len()),
        };

        for (idx, descriptor) in descriptors.iter().enumerate() {
            let name = descriptor.policy.name();
            if descriptors[..idx].iter().any(|d| d.policy.name() == name) {
                return Err(RestError::configuration(format!(
                    "Duplicate policy names not allowed in pipeline: {name}"
                )));
            }
            let after_phase = descriptor.options.after_phase.map(|p| phase_slot(Some(p)));
            if let Some(slot) = after_phase {
                graph.phases[slot].has_after_policies = true;
            }
            graph.nodes.push(Node {
                depends_on: BTreeSet::new(),
                dependants: BTreeSet::new(),
                after_phase,
            });
            graph.phases[phase_slot(descriptor.options.phase)]
                .members
                .push(idx);
        }

        let index_of = |name: &str| descriptors.iter().position(|d| d.policy.name() == name);
        for (idx, descriptor) in descriptors.iter().enumerate() {
            for after in &descriptor.options.after_policies {
                if let Some(dep) = index_of(after) {
                    graph.nodes[idx].depends_on.insert(dep);
                    graph.nodes[dep].dependants.insert(idx);
                }
            }
            for before in &descriptor.options.before_policies {
                if let Some(dep) = index_of(before) {
                    graph.nodes[dep].depends_on.insert(idx);
                    graph.nodes[idx].dependants.insert(dep);
                }
            }
        }
        Ok(graph)
    }

    fn walk_phase(&mut self, slot: usize) {
        self.phases[slot].has_run = true;
        let mut i = 0;
        while i < self.phases[slot].members.len() {
            let node = self.phases[slot].members[i];
            if let Some(after) = self.nodes[node].after_phase {
                if !self.phases[after].has_run || !self.phases[after].members.is_empty() {
                    i += 1;
                    continue;
                }
            }
            if self.nodes[node].depends_on.is_empty() {
                self.result.push(node);
                let dependants = std::mem::take(&mut self.nodes[node].dependants);
                for dependant in dependants {
                    self.nodes[dependant].depends_on.remove(&node);
                }
                self.phases[slot].members.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn walk_phases(&mut self) {
        for slot in [SERIALIZE, NO_PHASE, DESERIALIZE, RETRY, SIGN] {
            self.walk_phase(slot);
            if slot != NO_PHASE && !self.phases[slot].members.is_empty() {
                // The phase is blocked; give unphased policies a chance and
                // stop here until it drains.
                if !self.phases[NO_PHASE].has_run {
                    self.walk_phase(NO_PHASE);
                }
                return;
            }
            if self.phases[slot].has_after_policies {
                self.walk_phase(NO_PHASE);
            }
        }
    }
}

fn order_policies(descriptors: &[PolicyDescriptor]) -> RestResult<Vec<Arc<dyn Policy>>> {
    let mut graph = PolicyGraph::build(descriptors)?;
    let mut iteration = 0;
    while graph.result.len() < descriptors.len() {
        iteration += 1;
        let before = graph.result.len();
        graph.walk_phases();
        if graph.result.len() <= before && iteration > 1 {
            return Err(RestError::configuration(
                "Cannot satisfy policy dependencies due to requirements cycle.",
            ));
        }
    }
    Ok(graph
        .result
        .into_iter()
        .map(|idx| Arc::clone(&descriptors[idx].policy))
        .collect())
}
