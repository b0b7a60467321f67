//! Atomic stock-adjustment port.
//!
//! The per-variant counters are the only state mutated concurrently by
//! multiple handlers, so every mutation is a single conditional update on
//! the port, never a read-then-write pair across calls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::VariantId;

use crate::error::SagaError;

/// Conditional stock-counter updates.
#[async_trait]
pub trait StockAdjuster: Send + Sync {
    /// Atomically reserves `quantity` units if `available >= quantity`,
    /// where available is total stock minus the reserved counter.
    /// Returns true when the reservation was applied.
    async fn try_reserve(&self, variant_id: VariantId, quantity: u32) -> Result<bool, SagaError>;

    /// Decrements the reserved counter.
    async fn decrement_reserved(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<(), SagaError>;

    /// Decrements total on-hand stock (post-payment confirmation).
    async fn decrement_total_stock(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<(), SagaError>;
}

#[derive(Debug, Clone, Copy, Default)]
struct StockLevel {
    total: u32,
    reserved: u32,
}

#[derive(Debug, Default)]
struct InMemoryStockState {
    levels: HashMap<VariantId, StockLevel>,
    fail_on_adjust: bool,
}

/// In-memory stock adjuster for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStock {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStock {
    /// Creates a new adjuster with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets total on-hand stock for a variant.
    pub fn set_stock(&self, variant_id: VariantId, total: u32) {
        self.state
            .write()
            .unwrap()
            .levels
            .insert(variant_id, StockLevel { total, reserved: 0 });
    }

    /// Configures every adjustment call to fail, simulating an
    /// infrastructure error during handling.
    pub fn set_fail_on_adjust(&self, fail: bool) {
        self.state.write().unwrap().fail_on_adjust = fail;
    }

    /// Returns the reserved counter for a variant.
    pub fn reserved(&self, variant_id: VariantId) -> u32 {
        self.state
            .read()
            .unwrap()
            .levels
            .get(&variant_id)
            .map(|l| l.reserved)
            .unwrap_or(0)
    }

    /// Returns total on-hand stock for a variant.
    pub fn total(&self, variant_id: VariantId) -> u32 {
        self.state
            .read()
            .unwrap()
            .levels
            .get(&variant_id)
            .map(|l| l.total)
            .unwrap_or(0)
    }

    /// Returns available stock (total minus reserved).
    pub fn available(&self, variant_id: VariantId) -> u32 {
        self.state
            .read()
            .unwrap()
            .levels
            .get(&variant_id)
            .map(|l| l.total.saturating_sub(l.reserved))
            .unwrap_or(0)
    }
}

#[async_trait]
impl StockAdjuster for InMemoryStock {
    async fn try_reserve(&self, variant_id: VariantId, quantity: u32) -> Result<bool, SagaError> {
        // Check and increment under one lock acquisition: the compare and
        // the update must be a single atomic step.
        let mut state = self.state.write().unwrap();
        if state.fail_on_adjust {
            return Err(SagaError::Port("stock adjuster unavailable".to_string()));
        }
        let level = state.levels.entry(variant_id).or_default();
        if level.total.saturating_sub(level.reserved) >= quantity {
            level.reserved += quantity;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn decrement_reserved(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_adjust {
            return Err(SagaError::Port("stock adjuster unavailable".to_string()));
        }
        let level = state.levels.entry(variant_id).or_default();
        level.reserved = level.reserved.saturating_sub(quantity);
        Ok(())
    }

    async fn decrement_total_stock(
        &self,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_adjust {
            return Err(SagaError::Port("stock adjuster unavailable".to_string()));
        }
        let level = state.levels.entry(variant_id).or_default();
        level.total = level.total.saturating_sub(quantity);
        Ok(())
    }
}
