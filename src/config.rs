use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    fit::{CorrectionFit, CorrectionModel},
    Error,
};

#[derive(Deserialize, Clone, Copy, Serialize)]
pub struct TemperatureCorrection {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

#[derive(Deserialize, Clone, Copy, Serialize)]
pub struct AmbientCorrection {
    pub enabled: bool,
    pub reference_temp: f64,
    pub coefficient: f64,
}

/// Persisted correction settings, stored as TOML. Unknown sections and keys
/// are ignored on load so the file can be shared with other tools.
#[derive(Deserialize, Clone, Copy, Serialize)]
pub struct CorrectionSettings {
    pub temperature_correction: TemperatureCorrection,
    pub ambient_correction: AmbientCorrection,
}

impl Default for CorrectionSettings {
    // Factory coefficients, measured against the reference bath.
    fn default() -> Self {
        Self {
            temperature_correction: TemperatureCorrection {
                a: 0.0039,
                b: -0.4355,
                c: 4.8536,
            },
            ambient_correction: AmbientCorrection {
                enabled: false,
                reference_temp: 20.0,
                coefficient: 0.0,
            },
        }
    }
}

impl CorrectionSettings {
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|base_dirs| {
            base_dirs
                .config_dir()
                .join("tec-temp-correction")
                .join("correction.toml")
        })
    }

    /// Load from `path`. A missing or unreadable file is not fatal, the
    /// instrument must stay operable with factory coefficients.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "failed to read {}: {e}, using default coefficients",
                    path.display()
                );
                return Self::default();
            }
        };

        match toml::from_str::<Self>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    "failed to parse {}: {e}, using default coefficients",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::ConfigPersistence)?;
        }
        let body = toml::to_string_pretty(self).map_err(|e| {
            Error::ConfigPersistence(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let contents = format!(
            "# updated {}\n{body}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        std::fs::write(path, contents).map_err(Error::ConfigPersistence)?;
        tracing::info!("correction settings saved to {}", path.display());
        Ok(())
    }

    pub fn model(&self) -> CorrectionModel {
        CorrectionModel {
            a: self.temperature_correction.a,
            b: self.temperature_correction.b,
            c: self.temperature_correction.c,
            use_ambient: self.ambient_correction.enabled,
            ambient_ref: Some(self.ambient_correction.reference_temp),
            ambient_coeff: Some(self.ambient_correction.coefficient),
        }
    }

    /// Replace the stored coefficients with freshly fitted ones. Old values
    /// are logged so a bad calibration run can be rolled back by hand.
    pub fn apply_fit(&mut self, fit: &CorrectionFit) {
        let old = self.temperature_correction;
        tracing::info!(
            "updating coefficients: a {:.6} -> {:.6}, b {:.6} -> {:.6}, c {:.6} -> {:.6}",
            old.a,
            fit.model.a,
            old.b,
            fit.model.b,
            old.c,
            fit.model.c
        );
        self.temperature_correction = TemperatureCorrection {
            a: fit.model.a,
            b: fit.model.b,
            c: fit.model.c,
        };
        if fit.model.use_ambient {
            if let (Some(reference), Some(coeff)) = (fit.model.ambient_ref, fit.model.ambient_coeff)
            {
                self.ambient_correction = AmbientCorrection {
                    enabled: true,
                    reference_temp: reference,
                    coefficient: coeff,
                };
            }
        }
    }
}

impl std::fmt::Display for CorrectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "TemperatureCorrection:")?;
        writeln!(f, "  a: {}", self.temperature_correction.a)?;
        writeln!(f, "  b: {}", self.temperature_correction.b)?;
        writeln!(f, "  c: {}", self.temperature_correction.c)?;

        writeln!(f, "AmbientCorrection:")?;
        writeln!(f, "  Enabled: {}", self.ambient_correction.enabled)?;
        writeln!(f, "  ReferenceTemp: {}", self.ambient_correction.reference_temp)?;
        writeln!(f, "  Coefficient: {}", self.ambient_correction.coefficient)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CorrectionSettings::load(&dir.path().join("nope.toml"));
        assert!((settings.temperature_correction.a - 0.0039).abs() < 1e-12);
        assert!((settings.temperature_correction.b - (-0.4355)).abs() < 1e-12);
        assert!((settings.temperature_correction.c - 4.8536).abs() < 1e-12);
        assert!(!settings.ambient_correction.enabled);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("correction.toml");
        std::fs::write(&path, "[temperature_correction]\na = \"oops\"\n").unwrap();
        let settings = CorrectionSettings::load(&path);
        assert!((settings.temperature_correction.c - 4.8536).abs() < 1e-12);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("correction.toml");

        let mut settings = CorrectionSettings::default();
        settings.temperature_correction.a = 0.001;
        settings.ambient_correction.enabled = true;
        settings.ambient_correction.coefficient = 0.05;
        settings.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("[temperature_correction]"));
        assert!(raw.contains("[ambient_correction]"));

        let loaded = CorrectionSettings::load(&path);
        assert!((loaded.temperature_correction.a - 0.001).abs() < 1e-12);
        assert!(loaded.ambient_correction.enabled);
        assert!((loaded.ambient_correction.coefficient - 0.05).abs() < 1e-12);
    }

    #[test]
    fn apply_fit_replaces_coefficients() {
        let mut settings = CorrectionSettings::default();
        let fit = CorrectionFit {
            model: CorrectionModel {
                a: 0.003,
                b: -0.3,
                c: 6.0,
                use_ambient: true,
                ambient_ref: Some(22.0),
                ambient_coeff: Some(0.08),
            },
            a_err: 0.0,
            b_err: 0.0,
            c_err: 0.0,
            ambient_coeff_err: Some(0.0),
            r_squared: 1.0,
            rmse: 0.0,
            fitted: true,
        };
        settings.apply_fit(&fit);

        assert!((settings.temperature_correction.b - (-0.3)).abs() < 1e-12);
        assert!(settings.ambient_correction.enabled);
        assert!((settings.ambient_correction.reference_temp - 22.0).abs() < 1e-12);
    }

    #[test]
    fn model_carries_the_ambient_switch() {
        let mut settings = CorrectionSettings::default();
        settings.ambient_correction.enabled = true;
        settings.ambient_correction.coefficient = 0.1;
        let model = settings.model();
        assert!(model.use_ambient);
        assert_eq!(model.ambient_coeff, Some(0.1));
    }
}
