//! KV cache capacity planning
//!
//! Pure arithmetic: per-token byte costs from the model shape, and the
//! global token budget from one device's free memory. Every device derives
//! identical block byte costs from the same configuration; only device 0
//! computes the budget.

use serde::{Deserialize, Serialize};
use tessera_types::{ModelConfig, Result, TesseraError, SCALE_ELEMENT_BYTES};
use tracing::warn;

/// Per-token, per-device byte costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBytes {
    /// Main cache bytes per token (key and value together)
    pub cache_block_bytes: u64,
    /// Scale factor bytes per token; 0 when the cache is unquantized
    pub scale_block_bytes: u64,
}

impl BlockBytes {
    /// Combined footprint of one token
    pub fn per_token_bytes(&self) -> u64 {
        self.cache_block_bytes + self.scale_block_bytes
    }
}

/// The global token budget and how it was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Free memory observed on the leader device
    pub available_bytes: u64,
    /// `floor(max_tokens_scale × available_bytes)`
    pub reserved_bytes: u64,
    /// `max_tokens × cache_block_bytes`
    pub cache_max_bytes: u64,
    /// `max_tokens × scale_block_bytes`
    pub scale_max_bytes: u64,
    pub max_tokens: u64,
}

/// Capacity planning calculator
pub struct CapacityPlanner;

impl CapacityPlanner {
    /// Per-token byte costs on one of `tensor_parallel_size` devices.
    ///
    /// Evaluated left to right in integer arithmetic:
    /// `num_layers × 2 × num_kv_heads / tp × hidden_dim / num_heads × elem`,
    /// and for quantized caches
    /// `num_layers × 2 × num_kv_heads / tp × hidden_dim / num_heads / group × 2`.
    /// A truncating division is logged, not rejected.
    pub fn compute_block_bytes(
        model: &ModelConfig,
        tensor_parallel_size: usize,
    ) -> Result<BlockBytes> {
        model.validate()?;
        if tensor_parallel_size == 0 {
            return Err(TesseraError::config("tensor_parallel_size must be at least 1"));
        }
        let dtype = model.cache_data_type()?;

        let mut calc = Calc::default();
        let per_head = calc.mul(u64::from(model.num_layers), 2)?;
        let per_head = calc.mul(per_head, u64::from(model.num_kv_heads))?;
        let per_head = calc.div(per_head, tensor_parallel_size as u64, "tensor_parallel_size");
        let per_head = calc.mul(per_head, u64::from(model.hidden_dim))?;
        let elements = calc.div(per_head, u64::from(model.num_heads), "num_heads");

        let cache_block_bytes = calc.mul(elements, dtype.size_bytes())?;
        let scale_block_bytes = if dtype.is_quantized() {
            let groups = calc.div(
                elements,
                u64::from(model.cache_quant_group),
                "cache_quant_group",
            );
            let scale = calc.mul(groups, SCALE_ELEMENT_BYTES)?;
            if scale == 0 {
                return Err(TesseraError::config(format!(
                    "cache_quant_group {} exceeds the {} cache elements per token",
                    model.cache_quant_group, elements
                )));
            }
            scale
        } else {
            0
        };

        if !calc.inexact.is_empty() {
            warn!(
                divisors = ?calc.inexact,
                cache_block_bytes,
                scale_block_bytes,
                "block byte computation truncated; configuration does not divide evenly"
            );
        }
        if cache_block_bytes == 0 {
            return Err(TesseraError::config(format!(
                "model shape yields 0 cache bytes per token with tensor_parallel_size {}",
                tensor_parallel_size
            )));
        }

        Ok(BlockBytes {
            cache_block_bytes,
            scale_block_bytes,
        })
    }

    /// Number of tokens whose cache fits in `max_tokens_scale` of
    /// `available_bytes`.
    ///
    /// `max_tokens = floor(max_tokens_scale × available_bytes) / (cache + scale)`
    pub fn compute_token_budget(
        available_bytes: u64,
        cache_block_bytes: u64,
        scale_block_bytes: u64,
        max_tokens_scale: f32,
    ) -> Result<TokenBudget> {
        if !(max_tokens_scale > 0.0 && max_tokens_scale <= 1.0) {
            return Err(TesseraError::config(format!(
                "max_tokens_scale must be in (0, 1], got {}",
                max_tokens_scale
            )));
        }
        let per_token = cache_block_bytes
            .checked_add(scale_block_bytes)
            .filter(|&b| b > 0)
            .ok_or_else(|| {
                TesseraError::config(format!(
                    "invalid per-token footprint: cache {} + scale {}",
                    cache_block_bytes, scale_block_bytes
                ))
            })?;

        let reserved_bytes =
            ((f64::from(max_tokens_scale) * available_bytes as f64).floor() as u64)
                .min(available_bytes);
        let max_tokens = reserved_bytes / per_token;

        Ok(TokenBudget {
            available_bytes,
            reserved_bytes,
            cache_max_bytes: max_tokens * cache_block_bytes,
            scale_max_bytes: max_tokens * scale_block_bytes,
            max_tokens,
        })
    }
}

#[derive(Default)]
struct Calc {
    inexact: Vec<&'static str>,
}

impl Calc {
    fn mul(&self, a: u64, b: u64) -> Result<u64> {
        a.checked_mul(b)
            .ok_or_else(|| TesseraError::config("block byte computation overflowed"))
    }

    fn div(&mut self, a: u64, b: u64, divisor: &'static str) -> u64 {
        if a % b != 0 {
            self.inexact.push(divisor);
        }
        a / b
    }
}
