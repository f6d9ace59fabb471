use itertools::Itertools;

use crate::Sample;

/// A target change larger than this marks a step boundary, °C.
pub const JUMP_THRESHOLD_C: f64 = 0.1;

/// Steps shorter than this are flagged and skipped by the pipeline.
pub const MIN_STEP_LEN: usize = 10;

/// No real calibration sequence programs anywhere near this many plateaus;
/// a plan exceeding it is malformed input.
pub const MAX_PLAN_STEPS: usize = 10_000;

/// The programmed temperature sequence of one experiment.
#[derive(Clone, Copy, Debug)]
pub struct StepPlan {
    pub start_temp: f64,
    pub stop_temp: f64,
    pub increment: f64,
}

impl StepPlan {
    /// Number of plateaus the sequence should produce. `None` for a zero or
    /// non-finite increment (single-temperature measurement) and for
    /// malformed plans programming more than [`MAX_PLAN_STEPS`] steps.
    pub fn expected_steps(&self) -> Option<usize> {
        if self.increment == 0.0 || !self.increment.is_finite() {
            return None;
        }
        let count = ((self.stop_temp - self.start_temp) / self.increment).abs();
        if !(count < MAX_PLAN_STEPS as f64) {
            return None;
        }
        Some(count as usize + 1)
    }

    /// Reconstruct the plan from the plateaus actually present in the target
    /// channel, for logs whose settings were not recorded.
    pub fn infer(samples: &[Sample]) -> Option<Self> {
        let mut plateaus: Vec<f64> = Vec::new();
        for sample in samples {
            if !sample.target_temp.is_finite() {
                continue;
            }
            let changed = plateaus
                .last()
                .map_or(true, |last| (sample.target_temp - last).abs() > JUMP_THRESHOLD_C);
            if changed {
                plateaus.push(sample.target_temp);
            }
        }

        match plateaus.as_slice() {
            [] => None,
            [only] => Some(Self {
                start_temp: *only,
                stop_temp: *only,
                increment: 0.0,
            }),
            [first, second, ..] => Some(Self {
                start_temp: *first,
                stop_temp: plateaus[plateaus.len() - 1],
                increment: second - first,
            }),
        }
    }
}

/// A contiguous run of samples sharing one programmed target temperature.
/// Borrowed from the input series; dropped once its offset is extracted.
#[derive(Clone, Copy, Debug)]
pub struct Step<'a> {
    index: usize,
    samples: &'a [Sample],
}

impl<'a> Step<'a> {
    /// Chronological position of the step within the series.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn samples(&self) -> &'a [Sample] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Too few samples to estimate a steady state from.
    pub fn is_short(&self) -> bool {
        self.samples.len() < MIN_STEP_LEN
    }

    pub fn mean_target(&self) -> f64 {
        crate::offset::mean(
            &self
                .samples
                .iter()
                .map(|s| s.target_temp)
                .collect::<Vec<_>>(),
        )
    }
}

/// Split a series into temperature steps at the points where the target
/// channel jumps by more than [`JUMP_THRESHOLD_C`].
///
/// When a plan is supplied and the detected boundaries fall short of the
/// programmed step count, the series is partitioned into equal-length chunks
/// instead. That is a deliberate degraded mode for malformed or incomplete
/// logs whose target channel never recorded the setpoint changes.
pub fn split_steps<'a>(samples: &'a [Sample], plan: Option<&StepPlan>) -> Vec<Step<'a>> {
    if samples.is_empty() {
        return vec![];
    }

    let mut changes = Vec::new();
    for (i, (prev, cur)) in samples.iter().tuple_windows().enumerate() {
        if (cur.target_temp - prev.target_temp).abs() > JUMP_THRESHOLD_C {
            changes.push(i + 1);
        }
    }

    let expected = plan.and_then(StepPlan::expected_steps).unwrap_or(1);
    let steps = if expected > 1 && changes.len() < expected - 1 {
        tracing::info!(
            "detected {} target changes but the plan programs {} steps, \
             splitting the series into equal chunks",
            changes.len(),
            expected
        );
        equal_chunks(samples, expected)
    } else {
        tracing::debug!("detected {} target changes", changes.len());
        let mut bounds = Vec::with_capacity(changes.len() + 2);
        bounds.push(0);
        bounds.extend(changes);
        bounds.push(samples.len());
        bounds
            .iter()
            .tuple_windows()
            .enumerate()
            .map(|(index, (&start, &end))| Step {
                index,
                samples: &samples[start..end],
            })
            .collect()
    };

    for step in &steps {
        tracing::debug!(
            "step {}: mean target {:.2} °C, {} samples",
            step.index() + 1,
            step.mean_target(),
            step.len()
        );
    }

    steps
}

fn equal_chunks<'a>(samples: &'a [Sample], count: usize) -> Vec<Step<'a>> {
    let chunk = samples.len() / count;
    if chunk == 0 {
        // fewer samples than programmed steps, nothing sensible to split
        return vec![Step { index: 0, samples }];
    }

    (0..count)
        .map(|index| {
            let start = index * chunk;
            let end = if index == count - 1 {
                samples.len()
            } else {
                (index + 1) * chunk
            };
            Step {
                index,
                samples: &samples[start..end],
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn plateau_series(targets: &[f64], len_each: usize) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (k, &target) in targets.iter().enumerate() {
            for i in 0..len_each {
                let t = (k * len_each + i) as f64;
                samples.push(Sample::new(t, target, target - 0.5).with_liquid(target + 0.3));
            }
        }
        samples
    }

    #[test]
    fn recovers_each_plateau_as_one_step() {
        let samples = plateau_series(&[20.0, 25.0, 30.0, 35.0], 40);
        let steps = split_steps(&samples, None);
        assert_eq!(steps.len(), 4);
        for (step, target) in steps.iter().zip([20.0, 25.0, 30.0, 35.0]) {
            assert_eq!(step.len(), 40);
            assert!((step.mean_target() - target).abs() < 1e-12);
        }
    }

    #[test]
    fn constant_target_is_a_single_step() {
        let samples = plateau_series(&[25.0], 100);
        let steps = split_steps(&samples, None);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].len(), 100);
    }

    #[test]
    fn sub_threshold_wobble_does_not_split() {
        let mut samples = plateau_series(&[25.0], 50);
        for (i, sample) in samples.iter_mut().enumerate() {
            sample.target_temp += if i % 2 == 0 { 0.04 } else { -0.04 };
        }
        assert_eq!(split_steps(&samples, None).len(), 1);
    }

    #[test]
    fn falls_back_to_equal_chunks_when_changes_are_missing() {
        // A log whose target channel was stuck at one value although the
        // plan programmed five steps.
        let samples = plateau_series(&[25.0], 100);
        let plan = StepPlan {
            start_temp: 20.0,
            stop_temp: 40.0,
            increment: 5.0,
        };
        let steps = split_steps(&samples, Some(&plan));
        assert_eq!(steps.len(), 5);
        assert_eq!(steps.iter().map(Step::len).sum::<usize>(), 100);
        assert_eq!(steps[4].len(), 20);
    }

    #[test]
    fn equal_chunk_remainder_goes_to_the_last_step() {
        let samples = plateau_series(&[25.0], 103);
        let plan = StepPlan {
            start_temp: 20.0,
            stop_temp: 40.0,
            increment: 10.0,
        };
        let steps = split_steps(&samples, Some(&plan));
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].len(), 35);
    }

    #[test]
    fn short_steps_are_flagged_not_dropped() {
        let mut samples = plateau_series(&[20.0], 50);
        samples.extend(plateau_series(&[30.0], 4).iter().map(|s| {
            let mut s = *s;
            s.time += 50.0;
            s
        }));
        let steps = split_steps(&samples, None);
        assert_eq!(steps.len(), 2);
        assert!(!steps[0].is_short());
        assert!(steps[1].is_short());
    }

    #[test]
    fn plan_inference_from_plateaus() {
        let samples = plateau_series(&[20.0, 22.5, 25.0, 27.5], 30);
        let plan = StepPlan::infer(&samples).unwrap();
        assert_eq!(plan.start_temp, 20.0);
        assert_eq!(plan.stop_temp, 27.5);
        assert!((plan.increment - 2.5).abs() < 1e-12);
        assert_eq!(plan.expected_steps(), Some(4));
    }

    #[test]
    fn absurd_increment_invalidates_the_plan() {
        let plan = StepPlan {
            start_temp: 0.0,
            stop_temp: 100.0,
            increment: 1e-300,
        };
        assert_eq!(plan.expected_steps(), None);
        // an unusable plan must not disturb boundary detection
        let samples = plateau_series(&[25.0], 30);
        assert_eq!(split_steps(&samples, Some(&plan)).len(), 1);
    }

    #[test]
    fn zero_increment_plan_expects_no_split() {
        let plan = StepPlan {
            start_temp: 25.0,
            stop_temp: 25.0,
            increment: 0.0,
        };
        assert_eq!(plan.expected_steps(), None);
        let samples = plateau_series(&[25.0], 60);
        assert_eq!(split_steps(&samples, Some(&plan)).len(), 1);
    }
}
