//! Running per-field statistics with associative merge.

use serde::Serialize;
use serde_json::{Number, Value};

/// Running aggregate of one field: count, sum, sum of squares, min, max.
///
/// `min`/`max` are unspecified while `count == 0`. Partition-and-merge
/// over any split of the samples equals sequential accumulation for
/// `count`/`min`/`max` (sums may differ by float rounding across
/// partitions, exact for integer-valued inputs).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stat {
    pub count: u64,
    pub sum: f64,
    pub sum2: f64,
    pub min: f64,
    pub max: f64,
}

impl Stat {
    pub fn new() -> Stat {
        Stat::default()
    }

    pub fn reset(&mut self) {
        *self = Stat::default();
    }

    /// Add one sample. The first sample seeds `min`/`max` unconditionally;
    /// afterwards the `<`/`>` guards are false for NaN, so NaN never
    /// replaces an established extreme. This keeps `merge` associative.
    pub fn add(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            if x < self.min {
                self.min = x;
            }
            if x > self.max {
                self.max = x;
            }
        }
        self.sum += x;
        self.sum2 += x * x;
        self.count += 1;
    }

    /// Fold another aggregate in. Merging an empty aggregate is a no-op;
    /// merging into an empty one adopts the other's extremes.
    pub fn merge(&mut self, other: &Stat) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 || other.min < self.min {
            self.min = other.min;
        }
        if self.count == 0 || other.max > self.max {
            self.max = other.max;
        }
        self.sum += other.sum;
        self.sum2 += other.sum2;
        self.count += other.count;
    }

    /// The shipping result object. `sum2` is internal and not emitted.
    pub fn summary(&self) -> Summary {
        if self.count == 0 {
            return Summary {
                avg: Value::Null,
                sum: Value::from(0),
                min: Value::Null,
                max: Value::Null,
                count: 0,
            };
        }
        Summary {
            avg: number(self.sum / self.count as f64),
            sum: number(self.sum),
            min: number(self.min),
            max: number(self.max),
            count: self.count,
        }
    }
}

/// Per-field output object; fields serialize in declaration order.
#[derive(Debug, Serialize)]
pub struct Summary {
    avg: Value,
    sum: Value,
    min: Value,
    max: Value,
    count: u64,
}

/// Integral values become JSON integers so integer-valued datasets compare
/// bit-exact across worker counts; everything else keeps the float form.
/// Non-finite values have no JSON representation and become `null`.
fn number(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() <= i64::MAX as f64 {
        Value::Number(Number::from(x as i64))
    } else {
        Number::from_f64(x).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_tracks_extremes_and_sums() {
        let mut stat = Stat::new();
        stat.add(3.0);
        stat.add(-1.0);
        stat.add(2.0);
        assert_eq!(stat.count, 3);
        assert_eq!(stat.sum, 4.0);
        assert_eq!(stat.sum2, 14.0);
        assert_eq!(stat.min, -1.0);
        assert_eq!(stat.max, 3.0);
    }

    #[test]
    fn merge_of_empty_is_noop() {
        let mut stat = Stat::new();
        stat.add(5.0);
        let before = stat;
        stat.merge(&Stat::new());
        assert_eq!(stat, before);
    }

    #[test]
    fn merge_into_empty_adopts_extremes() {
        let mut a = Stat::new();
        let mut b = Stat::new();
        b.add(7.0);
        b.add(9.0);
        a.merge(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn nan_counts_but_does_not_displace_extremes() {
        let mut stat = Stat::new();
        stat.add(1.0);
        stat.add(f64::NAN);
        stat.add(4.0);
        assert_eq!(stat.count, 3);
        assert_eq!(stat.min, 1.0);
        assert_eq!(stat.max, 4.0);
    }

    #[test]
    fn leading_nan_seeds_extremes() {
        // First sample seeds min/max unconditionally; later samples cannot
        // displace a NaN extreme. Merge behaves the same way, so both
        // orders agree.
        let mut stat = Stat::new();
        stat.add(f64::NAN);
        stat.add(2.0);
        assert!(stat.min.is_nan());
        assert!(stat.max.is_nan());

        let mut merged = Stat::new();
        let mut first = Stat::new();
        first.add(f64::NAN);
        let mut second = Stat::new();
        second.add(2.0);
        merged.merge(&first);
        merged.merge(&second);
        assert!(merged.min.is_nan());
        assert!(merged.max.is_nan());
    }

    #[test]
    fn empty_summary_uses_nulls() {
        let text = serde_json::to_string(&Stat::new().summary()).unwrap();
        assert_eq!(
            text,
            r#"{"avg":null,"sum":0,"min":null,"max":null,"count":0}"#
        );
    }

    #[test]
    fn integral_summary_prints_integers() {
        let mut stat = Stat::new();
        stat.add(1.0);
        stat.add(2.0);
        let text = serde_json::to_string(&stat.summary()).unwrap();
        assert_eq!(text, r#"{"avg":1.5,"sum":3,"min":1,"max":2,"count":2}"#);
    }

    proptest! {
        // Any partition-and-merge over integer-valued samples equals
        // sequential accumulation (sums are exact for small integers).
        #[test]
        fn partition_merge_matches_sequential(
            values in prop::collection::vec(-1000i32..1000, 0..200),
            split in 0usize..200,
        ) {
            let split = split.min(values.len());

            let mut sequential = Stat::new();
            for &v in &values {
                sequential.add(v as f64);
            }

            let mut left = Stat::new();
            let mut right = Stat::new();
            for &v in &values[..split] {
                left.add(v as f64);
            }
            for &v in &values[split..] {
                right.add(v as f64);
            }
            let mut merged = Stat::new();
            merged.merge(&left);
            merged.merge(&right);

            prop_assert_eq!(merged.count, sequential.count);
            prop_assert_eq!(merged.sum, sequential.sum);
            prop_assert_eq!(merged.sum2, sequential.sum2);
            if sequential.count > 0 {
                prop_assert_eq!(merged.min, sequential.min);
                prop_assert_eq!(merged.max, sequential.max);
            }
        }
    }
}
