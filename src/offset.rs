use num_traits::{Float, FromPrimitive};

use crate::{segment::Step, Error};

/// Fraction of a step, counted from its end, treated as near-equilibrium.
pub const STABLE_FRACTION: f64 = 0.2;

/// Minimal number of non-missing liquid samples the stable window must hold.
pub const MIN_STABLE_SAMPLES: usize = 5;

/// Steady-state statistics of one temperature step. The list of records
/// across all steps of an experiment is the fitting dataset. Immutable once
/// created.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct OffsetRecord {
    /// Desired liquid temperature when the log records it, mean target
    /// temperature otherwise. The x-axis of the correction fit.
    pub reference_temp: f64,
    pub holder_mean: f64,
    pub holder_std: f64,
    pub holder_offset: f64,
    pub liquid_mean: f64,
    pub liquid_std: f64,
    pub liquid_offset: f64,
    pub ambient_mean: Option<f64>,
    pub ambient_std: Option<f64>,
}

/// Estimate the steady-state offsets of a step from its terminal stable
/// window.
///
/// Soft failure: a window with fewer than [`MIN_STABLE_SAMPLES`] usable
/// liquid readings yields [`Error::InputData`]; the caller skips the step
/// and keeps going.
pub fn extract_offset(step: &Step) -> Result<OffsetRecord, Error> {
    let samples = step.samples();
    let stable_start = ((1.0 - STABLE_FRACTION) * samples.len() as f64).floor() as usize;
    let window = &samples[stable_start..];

    let liquid: Vec<f64> = window.iter().filter_map(|s| s.liquid_temp).collect();
    if liquid.len() < MIN_STABLE_SAMPLES {
        return Err(Error::InputData(format!(
            "step {}: stable window holds {} liquid samples, need {}",
            step.index() + 1,
            liquid.len(),
            MIN_STABLE_SAMPLES
        )));
    }

    let desired: Vec<f64> = window.iter().filter_map(|s| s.desired_temp).collect();
    let reference_temp = if desired.is_empty() {
        mean(
            &window
                .iter()
                .map(|s| s.target_temp)
                .collect::<Vec<_>>(),
        )
    } else {
        mean(&desired)
    };

    let holder: Vec<f64> = window.iter().map(|s| s.holder_temp).collect();
    let holder_mean = mean(&holder);
    let liquid_mean = mean(&liquid);

    let ambient: Vec<f64> = window.iter().filter_map(|s| s.ambient_temp).collect();
    let (ambient_mean, ambient_std) = if ambient.is_empty() {
        (None, None)
    } else {
        let m = mean(&ambient);
        (Some(m), Some(sample_std(&ambient, m)))
    };

    let record = OffsetRecord {
        reference_temp,
        holder_mean,
        holder_std: sample_std(&holder, holder_mean),
        holder_offset: holder_mean - reference_temp,
        liquid_mean,
        liquid_std: sample_std(&liquid, liquid_mean),
        liquid_offset: liquid_mean - reference_temp,
        ambient_mean,
        ambient_std,
    };

    tracing::debug!(
        "step {}: reference {:.2} °C, holder {:.2} ± {:.3} °C (offset {:.2}), \
         liquid {:.2} ± {:.3} °C (offset {:.2})",
        step.index() + 1,
        record.reference_temp,
        record.holder_mean,
        record.holder_std,
        record.holder_offset,
        record.liquid_mean,
        record.liquid_std,
        record.liquid_offset
    );

    Ok(record)
}

pub(crate) fn mean<T: Float + FromPrimitive>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let sum = values.iter().fold(T::zero(), |acc, v| acc + *v);
    sum / T::from_usize(values.len()).unwrap()
}

/// Sample standard deviation (ddof = 1). Zero for fewer than two values.
pub(crate) fn sample_std<T: Float + FromPrimitive>(values: &[T], mean: T) -> T {
    if values.len() < 2 {
        return T::zero();
    }
    let ss = values
        .iter()
        .fold(T::zero(), |acc, v| acc + (*v - mean).powi(2));
    (ss / T::from_usize(values.len() - 1).unwrap()).sqrt()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{segment::split_steps, Sample};

    fn constant_step(target: f64, liquid: f64, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| Sample::new(i as f64, target, target - 1.0).with_liquid(liquid))
            .collect()
    }

    #[test]
    fn constant_liquid_gives_zero_std_and_exact_offset() {
        let samples = constant_step(25.0, 24.2, 50);
        let steps = split_steps(&samples, None);
        let record = extract_offset(&steps[0]).unwrap();

        assert_eq!(record.liquid_std, 0.0);
        assert!((record.liquid_offset - (24.2 - 25.0)).abs() < 1e-12);
        assert!((record.reference_temp - 25.0).abs() < 1e-12);
        assert!(record.ambient_mean.is_none());
    }

    #[test]
    fn desired_channel_wins_over_mean_target() {
        let samples: Vec<Sample> = (0..50)
            .map(|i| {
                Sample::new(i as f64, 25.0, 24.0)
                    .with_liquid(24.5)
                    .with_desired(26.0)
            })
            .collect();
        let steps = split_steps(&samples, None);
        let record = extract_offset(&steps[0]).unwrap();

        assert!((record.reference_temp - 26.0).abs() < 1e-12);
        assert!((record.liquid_offset - (24.5 - 26.0)).abs() < 1e-12);
    }

    #[test]
    fn too_few_liquid_samples_is_a_soft_failure() {
        // Liquid channel present on only 4 of the last 10 samples.
        let mut samples = constant_step(25.0, 24.0, 50);
        for (i, sample) in samples.iter_mut().enumerate() {
            if i < 46 {
                sample.liquid_temp = None;
            }
        }
        let steps = split_steps(&samples, None);
        match extract_offset(&steps[0]) {
            Err(Error::InputData(_)) => {}
            other => panic!("expected InputData, got {other:?}"),
        }
    }

    #[test]
    fn stable_window_is_the_last_fifth() {
        // First 80 samples far from equilibrium, last 20 settled. Only the
        // settled values may contribute to the statistics.
        let mut samples = Vec::new();
        for i in 0..80 {
            samples.push(Sample::new(i as f64, 25.0, 10.0).with_liquid(10.0));
        }
        for i in 80..100 {
            samples.push(Sample::new(i as f64, 25.0, 24.0).with_liquid(24.5));
        }
        let steps = split_steps(&samples, None);
        let record = extract_offset(&steps[0]).unwrap();

        assert!((record.liquid_mean - 24.5).abs() < 1e-12);
        assert!((record.holder_mean - 24.0).abs() < 1e-12);
        assert_eq!(record.liquid_std, 0.0);
    }

    #[test]
    fn ambient_statistics_when_present() {
        let samples: Vec<Sample> = (0..50)
            .map(|i| {
                Sample::new(i as f64, 25.0, 24.0)
                    .with_liquid(24.5)
                    .with_ambient(21.0)
            })
            .collect();
        let steps = split_steps(&samples, None);
        let record = extract_offset(&steps[0]).unwrap();

        assert_eq!(record.ambient_mean, Some(21.0));
        assert_eq!(record.ambient_std, Some(0.0));
    }

    #[test]
    fn sample_std_uses_ddof_one() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert!((m - 5.0).abs() < 1e-12);
        // population std would be 2.0; the sample estimate is larger
        assert!((sample_std(&values, m) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }
}
