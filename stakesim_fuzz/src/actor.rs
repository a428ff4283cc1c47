//! Actors and capability composition.
//!
//! An [`Actor`] is a plain entity: an address, a signing key, a set of
//! capability tags, and a registry of named action generators. Capabilities
//! are applied one at a time through the `with_*` builder methods - any
//! subset of roles, in any order - and each application appends its tag,
//! grants its operations, and merges its generators into the registry.

use crate::environment::{ActorProfile, StepCx};
use crate::error::SimError;
use crate::{keeper, maker, pool_operator, staker, taker};

use ed25519_dalek::SigningKey;
use stakesim_env::Address;
use std::collections::BTreeMap;

/// Role tags, for introspection and population filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Staker,
    PoolOperator,
    Keeper,
    Maker,
    Taker,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Staker => "staker",
            Capability::PoolOperator => "pool_operator",
            Capability::Keeper => "keeper",
            Capability::Maker => "maker",
            Capability::Taker => "taker",
        };
        write!(f, "{}", name)
    }
}

/// What one generator step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An assertion-wrapped call ran to completion.
    Performed {
        action: &'static str,
        actor: Address,
    },
    /// No valid parameters existed this iteration; nothing was attempted.
    Skipped { action: &'static str },
}

impl StepOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            StepOutcome::Performed { action, .. } | StepOutcome::Skipped { action } => action,
        }
    }
}

/// An infinite, restartable stream of randomized scenario steps.
///
/// `step` either runs one assertion-wrapped call or yields
/// [`StepOutcome::Skipped`] when the environment offers no valid parameters.
/// Generators are never exhausted; restarting one means constructing it
/// fresh.
pub trait ActionGenerator {
    fn name(&self) -> &'static str;
    fn step(&mut self, cx: &mut StepCx<'_>) -> Result<StepOutcome, SimError>;
}

/// A simulated participant: identity plus composed capabilities.
pub struct Actor {
    pub address: Address,
    pub signing_key: SigningKey,
    pub capabilities: Vec<Capability>,
    pub actions: BTreeMap<&'static str, Box<dyn ActionGenerator>>,
}

impl Actor {
    pub fn new(address: Address, signing_key: SigningKey) -> Self {
        Self {
            address,
            signing_key,
            capabilities: Vec::new(),
            actions: BTreeMap::new(),
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Registers a generator under its name. Two bundles registering the
    /// same name is a composition bug.
    pub fn register_action(&mut self, generator: Box<dyn ActionGenerator>) {
        let name = generator.name();
        let previous = self.actions.insert(name, generator);
        assert!(previous.is_none(), "duplicate action generator `{}`", name);
    }

    pub fn add_capability(&mut self, capability: Capability) {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    pub fn profile(&self) -> ActorProfile {
        ActorProfile {
            address: self.address,
            capabilities: self.capabilities.clone(),
        }
    }

    // ── Capability bundles ───────────────────────────────────────────────

    pub fn with_staker(mut self) -> Self {
        staker::apply(&mut self);
        self
    }

    pub fn with_pool_operator(mut self) -> Self {
        pool_operator::apply(&mut self);
        self
    }

    pub fn with_keeper(mut self) -> Self {
        keeper::apply(&mut self);
        self
    }

    pub fn with_maker(mut self) -> Self {
        maker::apply(&mut self);
        self
    }

    pub fn with_taker(mut self) -> Self {
        taker::apply(&mut self);
        self
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("address", &self.address)
            .field("capabilities", &self.capabilities)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
