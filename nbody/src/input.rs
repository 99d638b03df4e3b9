use std::fmt::Display;
use std::io;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::body::{Bodies, Body};
use crate::error::{Error, Result};
use crate::vector::{Real, Vector};

fn malformed(message: impl Display) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed bodies document: {message}"),
    ))
}

fn parse_scalar<T: Real>(text: &str) -> Result<T> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| malformed(format!("`{text}` is not a number")))?;
    T::from(value).ok_or_else(|| malformed(format!("`{text}` does not fit the scalar type")))
}

fn parse_vector<T: Real, const D: usize>(text: &str) -> Result<Vector<T, D>> {
    let components: Vec<T> = text
        .split_whitespace()
        .map(parse_scalar)
        .collect::<Result<_>>()?;
    if components.len() != D {
        return Err(malformed(format!(
            "expected {D} components, found {}",
            components.len()
        )));
    }
    Ok(Vector::from_fn(|d| components[d]))
}

/// Decode a bodies document produced by [`crate::output::encode_bodies`].
/// The element schema is `{position: D floats, velocity: D floats, mass}`.
pub fn decode_bodies<T: Real, const D: usize>(bytes: &[u8]) -> Result<Bodies<T, D>> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut bodies = Bodies::new();
    let mut position: Option<Vector<T, D>> = None;
    let mut velocity: Option<Vector<T, D>> = None;
    let mut mass: Option<T> = None;
    let mut field: Option<Vec<u8>> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(start) => match start.name().as_ref() {
                b"bodies" => {}
                b"body" => {
                    position = None;
                    velocity = None;
                    mass = None;
                }
                name @ (b"position" | b"velocity" | b"mass") => {
                    field = Some(name.to_vec());
                }
                other => {
                    return Err(malformed(format!(
                        "unexpected element `{}`",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                match field.as_deref() {
                    Some(b"position") => position = Some(parse_vector(&text)?),
                    Some(b"velocity") => velocity = Some(parse_vector(&text)?),
                    Some(b"mass") => mass = Some(parse_scalar(&text)?),
                    _ => return Err(malformed("stray text outside a body field")),
                }
            }
            Event::End(end) => match end.name().as_ref() {
                b"body" => {
                    let position = position.take().ok_or_else(|| malformed("body without position"))?;
                    let velocity = velocity.take().ok_or_else(|| malformed("body without velocity"))?;
                    let mass = mass.take().ok_or_else(|| malformed("body without mass"))?;
                    if mass <= T::zero() {
                        return Err(malformed(format!(
                            "body {} has non-positive mass",
                            bodies.len()
                        )));
                    }
                    bodies.push(Body::new(position, velocity, mass));
                }
                b"position" | b"velocity" | b"mass" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(bodies)
}

/// Read a bodies document from disk; called on the root rank only, the
/// result is broadcast to the group.
pub fn read_bodies<T: Real, const D: usize>(path: &Path) -> Result<Bodies<T, D>> {
    let bytes = std::fs::read(path)?;
    decode_bodies(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_two_bodies() {
        let document = r#"<bodies>
  <body>
    <position>1 -2</position>
    <velocity>0.5 0.25</velocity>
    <mass>3</mass>
  </body>
  <body>
    <position>0 0</position>
    <velocity>0 -1</velocity>
    <mass>0.125</mass>
  </body>
</bodies>"#;
        let bodies: Bodies<f64, 2> = decode_bodies(document.as_bytes()).unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].position, Vector([1.0, -2.0]));
        assert_eq!(bodies[0].velocity, Vector([0.5, 0.25]));
        assert_eq!(bodies[0].mass, 3.0);
        assert_eq!(bodies[1].mass, 0.125);
    }

    #[test]
    fn test_component_count_is_checked() {
        let document = "<bodies><body><position>1 2 3</position><velocity>0 0</velocity><mass>1</mass></body></bodies>";
        assert!(decode_bodies::<f64, 2>(document.as_bytes()).is_err());
    }

    #[test]
    fn test_non_positive_mass_is_rejected() {
        let document = "<bodies><body><position>1 2</position><velocity>0 0</velocity><mass>0</mass></body></bodies>";
        assert!(decode_bodies::<f64, 2>(document.as_bytes()).is_err());
    }
}
