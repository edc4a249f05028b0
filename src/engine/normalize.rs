/// Min-max scaling fitted to one metric across the whole population.
///
/// A degenerate population (empty, or every value equal) maps everything to
/// 0: a uniform signal is suppressed rather than treated as maximal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    bounds: Option<(f64, f64)>,
}

impl MinMax {
    pub fn fit<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut bounds: Option<(f64, f64)> = None;
        for value in values {
            bounds = Some(match bounds {
                None => (value, value),
                Some((min, max)) => (min.min(value), max.max(value)),
            });
        }
        match bounds {
            Some((min, max)) if max > min => Self { bounds: Some((min, max)) },
            _ => Self { bounds: None },
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self.bounds {
            Some((min, max)) => ((value - min) / (max - min)).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}
