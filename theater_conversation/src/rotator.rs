use rand::Rng;

/// Picks who speaks next: mostly round-robin, sometimes a random interruption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonaRotator {
    /// Chance that a turn goes to a uniformly random persona, the previous
    /// speaker included.
    pub interruption_probability: f64,
}

impl Default for PersonaRotator {
    fn default() -> Self {
        Self {
            interruption_probability: 0.3,
        }
    }
}

impl PersonaRotator {
    #[must_use]
    pub const fn new(interruption_probability: f64) -> Self {
        Self {
            interruption_probability,
        }
    }

    /// Index of the next speaker. The first turn of a run (`current == None`)
    /// always goes to persona 0.
    pub fn next_speaker<R: Rng + ?Sized>(
        &self,
        current: Option<usize>,
        persona_count: usize,
        rng: &mut R,
    ) -> usize {
        if persona_count <= 1 {
            return 0;
        }
        let Some(current) = current else {
            return 0;
        };

        let p = self.interruption_probability.clamp(0.0, 1.0);
        if rng.gen_bool(p) {
            rng.gen_range(0..persona_count)
        } else {
            (current + 1) % persona_count
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn strict_round_robin_without_interruptions() {
        let rotator = PersonaRotator::new(0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut current = None;
        let mut order = Vec::new();
        for _ in 0..7 {
            let next = rotator.next_speaker(current, 3, &mut rng);
            order.push(next);
            current = Some(next);
        }
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn single_persona_always_speaks() {
        let rotator = PersonaRotator::new(1.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(rotator.next_speaker(Some(0), 1, &mut rng), 0);
        }
    }

    #[test]
    fn interruptions_stay_in_range() {
        let rotator = PersonaRotator::new(1.0);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            assert!(rotator.next_speaker(Some(1), 4, &mut rng) < 4);
        }
    }

    #[test]
    fn every_persona_gets_a_fair_share() {
        let rotator = PersonaRotator::default();
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts = [0_usize; 3];
        let mut current = None;
        for _ in 0..30_000 {
            let next = rotator.next_speaker(current, 3, &mut rng);
            counts[next] += 1;
            current = Some(next);
        }
        for count in counts {
            assert!((9_000..=11_000).contains(&count), "unbalanced: {counts:?}");
        }
    }

    #[test]
    fn default_mix_is_mostly_round_robin() {
        let rotator = PersonaRotator::default();
        let mut rng = StdRng::seed_from_u64(99);
        let mut sequential = 0;
        for _ in 0..10_000 {
            if rotator.next_speaker(Some(0), 2, &mut rng) == 1 {
                sequential += 1;
            }
        }
        // 70% round-robin plus half of the 30% random picks land on 1.
        assert!((8_200..=8_800).contains(&sequential), "got {sequential}");
    }
}
