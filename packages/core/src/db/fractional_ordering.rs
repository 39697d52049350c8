//! Fractional sibling ordering
//!
//! Pages carry a `sort_order` among their siblings. New positions are placed
//! between neighbours so a reorder touches exactly one record.

/// Calculates the fractional order for placing a page between two siblings
pub struct FractionalOrderCalculator;

impl FractionalOrderCalculator {
    /// Calculate order value for inserting between prev and next
    ///
    /// # Examples
    /// ```
    /// # use pagetree_core::db::FractionalOrderCalculator;
    /// assert_eq!(FractionalOrderCalculator::calculate_order(None, Some(1.0)), 0.0);
    /// assert_eq!(FractionalOrderCalculator::calculate_order(Some(3.0), None), 4.0);
    /// assert_eq!(FractionalOrderCalculator::calculate_order(Some(1.0), Some(2.0)), 1.5);
    /// ```
    pub fn calculate_order(prev_order: Option<f64>, next_order: Option<f64>) -> f64 {
        match (prev_order, next_order) {
            (None, None) => 1.0,                             // First child
            (None, Some(next)) => next - 1.0,                // Before first
            (Some(prev), None) => prev + 1.0,                // After last
            (Some(prev), Some(next)) => (prev + next) / 2.0, // Between siblings
        }
    }

    /// Check if rebalancing is needed (gap too small)
    pub fn needs_rebalancing(orders: &[f64]) -> bool {
        orders.windows(2).any(|pair| pair[1] - pair[0] < 0.0001)
    }

    /// Evenly spaced orders `1.0..=count`
    pub fn rebalance(count: usize) -> Vec<f64> {
        (1..=count).map(|i| i as f64).collect()
    }
}
