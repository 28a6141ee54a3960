pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn gen_range(&mut self, range: std::ops::Range<f64>) -> f64 {
        let normalized = (self.next_u64() as f64) / (u64::MAX as f64);
        range.start + normalized * (range.end - range.start)
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    pub fn gen_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }
}
