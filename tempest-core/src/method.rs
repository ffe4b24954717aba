//! RPC method catalog and selection

use rand::{Rng, RngCore};
use serde_json::{json, Value};

use crate::config::WorkloadConfig;

pub const CHAIN_ID: &str = "eth_chainId";
pub const BLOCK_NUMBER: &str = "eth_blockNumber";
pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const GET_BALANCE: &str = "eth_getBalance";
pub const SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
pub const GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";

/// Methods a workload may issue
pub const KNOWN_METHODS: &[&str] = &[
    CHAIN_ID,
    BLOCK_NUMBER,
    GET_BLOCK_BY_NUMBER,
    GET_BALANCE,
    SEND_RAW_TRANSACTION,
];

/// How the `params` array of a method is produced
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTemplate {
    /// Sent as-is
    Fixed(Value),
    /// `[<client wallet address>, "latest"]`
    WalletBalance,
    /// `[<signed transfer hex>]`, built with the client's next nonce
    SignedTransfer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub method: &'static str,
    pub params: ParamTemplate,
}

impl MethodDescriptor {
    pub fn is_write(&self) -> bool {
        matches!(self.params, ParamTemplate::SignedTransfer)
    }

    /// Catalog entry for a known method name
    pub fn named(method: &str) -> Option<Self> {
        let descriptor = match method {
            CHAIN_ID => Self {
                method: CHAIN_ID,
                params: ParamTemplate::Fixed(json!([])),
            },
            BLOCK_NUMBER => Self {
                method: BLOCK_NUMBER,
                params: ParamTemplate::Fixed(json!([])),
            },
            // Heavy: full block with transactions
            GET_BLOCK_BY_NUMBER => Self {
                method: GET_BLOCK_BY_NUMBER,
                params: ParamTemplate::Fixed(json!(["latest", true])),
            },
            GET_BALANCE => Self {
                method: GET_BALANCE,
                params: ParamTemplate::WalletBalance,
            },
            SEND_RAW_TRANSACTION => Self {
                method: SEND_RAW_TRANSACTION,
                params: ParamTemplate::SignedTransfer,
            },
            _ => return None,
        };
        Some(descriptor)
    }
}

/// The finite set of methods an iteration chooses from
#[derive(Debug, Clone)]
pub struct MethodMix {
    methods: Vec<MethodDescriptor>,
}

impl MethodMix {
    /// Single fixed method
    pub fn fixed(descriptor: MethodDescriptor) -> Self {
        Self {
            methods: vec![descriptor],
        }
    }

    pub fn from_config(config: &WorkloadConfig) -> Self {
        if !config.mixed_methods {
            // validate() rejects unknown names; fall back to the light chain id read regardless
            let descriptor = MethodDescriptor::named(&config.fixed_method).unwrap_or(MethodDescriptor {
                method: CHAIN_ID,
                params: ParamTemplate::Fixed(json!([])),
            });
            return Self::fixed(descriptor);
        }

        let mut names = vec![CHAIN_ID, BLOCK_NUMBER, GET_BLOCK_BY_NUMBER, GET_BALANCE];
        if config.enable_writes {
            names.push(SEND_RAW_TRANSACTION);
        }
        Self {
            methods: names.into_iter().filter_map(MethodDescriptor::named).collect(),
        }
    }

    /// Uniform choice; a single-method mix never touches the rng
    pub fn select(&self, rng: &mut dyn RngCore) -> &MethodDescriptor {
        if self.methods.len() == 1 {
            return &self.methods[0];
        }
        &self.methods[rng.gen_range(0..self.methods.len())]
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn has_writes(&self) -> bool {
        self.methods.iter().any(MethodDescriptor::is_write)
    }
}
