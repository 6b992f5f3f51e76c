//! Spork values pinned by configuration.

use mx_types::{Spork, Sporks};

use crate::config::SporkConfig;

/// Sporks read from [`SporkConfig`] instead of the network.
#[derive(Clone, Debug, Default)]
pub struct StaticSporks {
    config: SporkConfig,
}

impl StaticSporks {
    pub fn new(config: SporkConfig) -> Self {
        Self { config }
    }
}

impl Sporks for StaticSporks {
    fn is_active(&self, spork: Spork) -> bool {
        match spork {
            Spork::PaymentEnforcement => self.config.payment_enforcement,
            Spork::PayUpdatedNodes => self.config.pay_updated_nodes,
        }
    }
}
