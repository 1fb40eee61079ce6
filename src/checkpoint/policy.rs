/// Running minimum of the epoch validation loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestLoss {
    best: f64,
}

impl BestLoss {
    pub fn new() -> Self {
        Self { best: f64::INFINITY }
    }

    /// Record `loss`; true iff it is strictly below every loss seen so far.
    pub fn observe(&mut self, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.best = f64::INFINITY;
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

impl Default for BestLoss {
    fn default() -> Self {
        Self::new()
    }
}
