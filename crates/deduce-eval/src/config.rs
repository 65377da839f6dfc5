//! Evaluation settings.

/// Join-ordering heuristic used when compiling rule bodies.
///
/// Higher scores are placed earlier; ties keep the written order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimization {
    /// Keep the body as written, moving literals only when they cannot be
    /// evaluated yet.
    #[default]
    AsWritten,
    /// Percentage of bound arguments. Filters go first, delta literals and
    /// nullary predicates get fixed scores.
    BoundRatio,
    /// Percentage of bound arguments without favouring negation or deltas.
    BoundRatioPlain,
    /// Like [`Optimization::BoundRatio`] with a stronger delta preference.
    BoundRatioDeltaFirst,
    /// Filters and delta literals first, everything else as written.
    FiltersFirst,
}

impl Optimization {
    pub fn from_level(level: u8) -> Option<Self> {
        Some(match level {
            0 => Optimization::AsWritten,
            1 => Optimization::BoundRatio,
            2 => Optimization::BoundRatioPlain,
            3 => Optimization::BoundRatioDeltaFirst,
            4 => Optimization::FiltersFirst,
            _ => return None,
        })
    }

    pub fn level(self) -> u8 {
        match self {
            Optimization::AsWritten => 0,
            Optimization::BoundRatio => 1,
            Optimization::BoundRatioPlain => 2,
            Optimization::BoundRatioDeltaFirst => 3,
            Optimization::FiltersFirst => 4,
        }
    }
}

/// Settings threaded through setup, the task pool and the stratum evaluators.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Number of worker threads.
    pub parallelism: usize,
    /// Run every task inline on the calling thread.
    pub sequential: bool,
    /// Use eager semi-naive evaluation instead of rounds.
    pub eager: bool,
    /// Join-ordering heuristic. Eager evaluation always uses
    /// [`Optimization::FiltersFirst`].
    pub optimization: Optimization,
    /// Tuples per task: facts per loading batch and the view size below which
    /// a lookup is not split further.
    pub task_size: usize,
    /// Largest lookup result copied out of an index eagerly.
    pub max_array_size: usize,
    /// Probes used to find the middle of a large lookup.
    pub num_guesses: usize,
    /// Relations whose contents are logged after each stratum.
    pub tracked_relations: Vec<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            sequential: false,
            eager: false,
            optimization: Optimization::AsWritten,
            task_size: 128,
            max_array_size: 1024,
            num_guesses: 8,
            tracked_relations: Vec::new(),
        }
    }
}

impl EvalConfig {
    pub fn sequential() -> Self {
        Self {
            sequential: true,
            ..Self::default()
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn with_optimization(mut self, optimization: Optimization) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn with_task_size(mut self, task_size: usize) -> Self {
        self.task_size = task_size.max(1);
        self
    }

    pub fn with_max_array_size(mut self, max_array_size: usize) -> Self {
        self.max_array_size = max_array_size;
        self
    }

    pub fn with_num_guesses(mut self, num_guesses: usize) -> Self {
        self.num_guesses = num_guesses;
        self
    }

    pub fn with_tracked_relations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_relations = names.into_iter().map(Into::into).collect();
        self
    }

    /// The ordering heuristic actually used for compilation.
    pub fn effective_optimization(&self) -> Optimization {
        if self.eager {
            Optimization::FiltersFirst
        } else {
            self.optimization
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_round_trip() {
        for level in 0..=4 {
            assert_eq!(Optimization::from_level(level).unwrap().level(), level);
        }
        assert_eq!(Optimization::from_level(5), None);
    }

    #[test]
    fn test_eager_forces_filters_first() {
        let config = EvalConfig::default()
            .with_optimization(Optimization::BoundRatio)
            .with_eager(true);
        assert_eq!(config.effective_optimization(), Optimization::FiltersFirst);
        assert_eq!(
            EvalConfig::default().effective_optimization(),
            Optimization::AsWritten
        );
    }
}
