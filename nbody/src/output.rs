use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::body::Bodies;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::vector::{Real, Vector};

fn encoding_failed(err: impl std::fmt::Display) -> Error {
    Error::Failure(format!("xml encoding failed: {err}"))
}

/// Encode a bodies document. The encoding is deterministic and round-trips
/// bit-identically through [`crate::input::decode_bodies`].
pub fn encode_bodies<T: Real, const D: usize>(bodies: &Bodies<T, D>) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("bodies")))
        .map_err(encoding_failed)?;
    for body in bodies {
        writer
            .write_event(Event::Start(BytesStart::new("body")))
            .map_err(encoding_failed)?;
        write_field(&mut writer, "position", &join_components(&body.position))?;
        write_field(&mut writer, "velocity", &join_components(&body.velocity))?;
        write_field(&mut writer, "mass", &body.mass.to_string())?;
        writer
            .write_event(Event::End(BytesEnd::new("body")))
            .map_err(encoding_failed)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("bodies")))
        .map_err(encoding_failed)?;
    Ok(writer.into_inner())
}

fn write_field(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))
        .map_err(encoding_failed)?;
    Ok(())
}

fn join_components<T: Real, const D: usize>(vector: &Vector<T, D>) -> String {
    vector.0.iter().format(" ").to_string()
}

fn encode_configuration<T: Real>(config: &Configuration<T>) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("configuration")))
        .map_err(encoding_failed)?;
    if let Some(number) = config.number {
        write_field(&mut writer, "number", &number.to_string())?;
    }
    if let Some(input) = &config.input {
        write_field(&mut writer, "input", &input.display().to_string())?;
    }
    write_field(&mut writer, "steps", &config.steps.to_string())?;
    write_field(
        &mut writer,
        "sample_interval",
        &config.sample_interval.to_string(),
    )?;
    write_field(&mut writer, "time", &config.time.to_string())?;
    write_field(
        &mut writer,
        "gravitational_constant",
        &config.gravitational_constant.to_string(),
    )?;
    write_field(&mut writer, "theta", &config.theta.to_string())?;
    write_field(
        &mut writer,
        "soften_length",
        &config.soften_length.to_string(),
    )?;
    write_field(&mut writer, "output", &config.output.display().to_string())?;
    write_field(
        &mut writer,
        "min_log_level",
        &config.min_log_level.to_string(),
    )?;
    writer
        .write_event(Event::End(BytesEnd::new("configuration")))
        .map_err(encoding_failed)?;
    Ok(writer.into_inner())
}

/// Output layout of a run, held by the root rank only. Snapshots and
/// metadata carry a leading underscore; numbered `.dat` files are the
/// position samples in emission order.
pub struct OutputWriter {
    dir: PathBuf,
    samples: usize,
}

impl OutputWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            samples: 0,
        })
    }

    /// `_configuration.xml`: the resolved configuration, for provenance.
    pub fn write_configuration<T: Real>(&self, config: &Configuration<T>) -> Result<()> {
        fs::write(
            self.dir.join("_configuration.xml"),
            encode_configuration(config)?,
        )?;
        Ok(())
    }

    /// `_bodies.xml` / `_bodies_finished.xml`: full body snapshots.
    pub fn write_bodies<T: Real, const D: usize>(
        &self,
        name: &str,
        bodies: &Bodies<T, D>,
    ) -> Result<()> {
        fs::write(self.dir.join(name), encode_bodies(bodies)?)?;
        Ok(())
    }

    /// `_time.txt` and `_sample.txt`: simulated seconds per sample and the
    /// number of samples a full run emits.
    pub fn write_metadata<T: Real>(&self, config: &Configuration<T>) -> Result<()> {
        let interval = T::from(config.sample_interval)
            .ok_or_else(|| Error::Failure("sample interval does not fit the scalar type".into()))?;
        fs::write(
            self.dir.join("_time.txt"),
            format!("{}\n", config.time * interval),
        )?;
        fs::write(
            self.dir.join("_sample.txt"),
            format!("{}\n", config.steps / config.sample_interval),
        )?;
        Ok(())
    }

    /// `_bounds.dat`: the extreme bounds encountered across the run.
    pub fn write_bounds<T: Real, const D: usize>(
        &self,
        min: &Vector<T, D>,
        max: &Vector<T, D>,
    ) -> Result<()> {
        fs::write(
            self.dir.join("_bounds.dat"),
            format!("min {}\nmax {}\n", join_components(min), join_components(max)),
        )?;
        Ok(())
    }

    /// The next numbered position sample: one body per line, `D` values.
    pub fn write_sample<T: Real, const D: usize>(&mut self, bodies: &Bodies<T, D>) -> Result<()> {
        let mut content = String::new();
        for body in bodies {
            let _ = writeln!(content, "{}", join_components(&body.position));
        }
        fs::write(self.dir.join(format!("{}.dat", self.samples)), content)?;
        self.samples += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::input::decode_bodies;

    fn sample_bodies() -> Bodies<f64, 3> {
        vec![
            Body::new(
                Vector([-0.97000436, 0.24308753, 0.0]),
                Vector([0.466203685, 0.43236573, 0.0]),
                1.0,
            ),
            Body::new(Vector([0.1, -0.25, 3.5]), Vector([0.0, 0.0, -1.0]), 0.5),
        ]
    }

    #[test]
    fn test_bodies_round_trip_is_bit_identical() {
        let bodies = sample_bodies();
        let encoded = encode_bodies(&bodies).unwrap();
        let decoded: Bodies<f64, 3> = decode_bodies(&encoded).unwrap();
        assert_eq!(decoded, bodies);
        assert_eq!(encode_bodies(&decoded).unwrap(), encoded);
    }

    #[test]
    fn test_sample_lines_hold_one_position_each() {
        let dir = std::env::temp_dir().join(format!("nbody-output-test-{}", std::process::id()));
        let mut writer = OutputWriter::create(&dir).unwrap();
        writer.write_sample(&sample_bodies()).unwrap();
        writer.write_sample(&sample_bodies()).unwrap();

        let first = fs::read_to_string(dir.join("0.dat")).unwrap();
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "-0.97000436 0.24308753 0");
        assert!(dir.join("1.dat").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
