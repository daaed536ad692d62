//! Byte limits for request lines and image bodies.
//!
//! A [`ByteBudget`] counts bytes as they pass and reports when a transfer
//! exceeds its cap, so neither direction ever buffers past a fixed bound.

/// Running byte count against a fixed cap.
#[derive(Debug, Clone, Copy)]
pub struct ByteBudget {
    limit: u64,
    used: u64,
}

impl ByteBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Account for `n` more bytes. Returns `false` once the total exceeds the cap.
    pub fn consume(&mut self, n: usize) -> bool {
        self.used = self.used.saturating_add(n as u64);
        self.used <= self.limit
    }

    /// Whether a transfer of `declared` bytes would fit at all.
    pub fn admits(&self, declared: u64) -> bool {
        self.used.saturating_add(declared) <= self.limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_limit_is_allowed() {
        let mut budget = ByteBudget::new(10);
        assert!(budget.consume(4));
        assert!(budget.consume(6));
        assert_eq!(budget.used(), budget.limit());
        assert!(!budget.consume(1));
        assert_eq!(budget.used(), 11);
    }

    #[test]
    fn declared_length_check() {
        let budget = ByteBudget::new(25);
        assert!(budget.admits(25));
        assert!(!budget.admits(26));
    }
}
