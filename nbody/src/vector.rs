use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::Float;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scalar type of the simulation. `f32` and `f64` are the intended
/// instantiations.
pub trait Real:
    Float
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
}

impl<T> Real for T where
    T: Float
        + AddAssign
        + SubAssign
        + MulAssign
        + DivAssign
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + 'static
{
}

/// An ordered tuple of `D` scalars. Arithmetic is component-wise and always
/// stays in dimension `D`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector<T, const D: usize>(pub [T; D]);

impl<T: Real, const D: usize> Vector<T, D> {
    pub fn zero() -> Self {
        Self([T::zero(); D])
    }

    pub fn from_fn<F: FnMut(usize) -> T>(f: F) -> Self {
        Self(std::array::from_fn(f))
    }

    /// Euclidean norm.
    pub fn norm(&self) -> T {
        self.0
            .iter()
            .fold(T::zero(), |acc, &v| acc + v * v)
            .sqrt()
    }
}

impl<T: Real, const D: usize> Default for Vector<T, D> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<T, const D: usize> Index<usize> for Vector<T, D> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.0[index]
    }
}

impl<T, const D: usize> IndexMut<usize> for Vector<T, D> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.0[index]
    }
}

impl<T: Real, const D: usize> Add for Vector<T, D> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_fn(|d| self.0[d] + rhs.0[d])
    }
}

impl<T: Real, const D: usize> Sub for Vector<T, D> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_fn(|d| self.0[d] - rhs.0[d])
    }
}

impl<T: Real, const D: usize> Neg for Vector<T, D> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_fn(|d| -self.0[d])
    }
}

impl<T: Real, const D: usize> AddAssign for Vector<T, D> {
    fn add_assign(&mut self, rhs: Self) {
        for d in 0..D {
            self.0[d] += rhs.0[d];
        }
    }
}

impl<T: Real, const D: usize> SubAssign for Vector<T, D> {
    fn sub_assign(&mut self, rhs: Self) {
        for d in 0..D {
            self.0[d] -= rhs.0[d];
        }
    }
}

impl<T: Real, const D: usize> Mul<T> for Vector<T, D> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        Self::from_fn(|d| self.0[d] * rhs)
    }
}

impl<T: Real, const D: usize> Div<T> for Vector<T, D> {
    type Output = Self;

    fn div(self, rhs: T) -> Self {
        Self::from_fn(|d| self.0[d] / rhs)
    }
}

/// Mass-weighted average of two weighted positions. Callers guarantee
/// `m1 + m2 > 0`; all body masses are positive.
pub fn accumulate_centroid<T: Real, const D: usize>(
    p1: Vector<T, D>,
    m1: T,
    p2: Vector<T, D>,
    m2: T,
) -> (Vector<T, D>, T) {
    let mass = m1 + m2;
    ((p1 * m1 + p2 * m2) / mass, mass)
}

/// In-place variant of [`accumulate_centroid`]; overwrites the first pair.
pub fn accumulate_centroid_into<T: Real, const D: usize>(
    p1: &mut Vector<T, D>,
    m1: &mut T,
    p2: Vector<T, D>,
    m2: T,
) {
    let (position, mass) = accumulate_centroid(*p1, *m1, p2, m2);
    *p1 = position;
    *m1 = mass;
}

impl<T: Serialize, const D: usize> Serialize for Vector<T, D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(D)?;
        for component in &self.0 {
            tuple.serialize_element(component)?;
        }
        tuple.end()
    }
}

impl<'de, T: Deserialize<'de>, const D: usize> Deserialize<'de> for Vector<T, D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        struct ComponentVisitor<T, const D: usize>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>, const D: usize> Visitor<'de> for ComponentVisitor<T, D> {
            type Value = Vector<T, D>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a sequence of {D} components")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut components = Vec::with_capacity(D);
                for i in 0..D {
                    components.push(
                        seq.next_element::<T>()?
                            .ok_or_else(|| de::Error::invalid_length(i, &self))?,
                    );
                }
                components
                    .try_into()
                    .map(Vector)
                    .map_err(|_| de::Error::custom("component count mismatch"))
            }
        }

        deserializer.deserialize_tuple(D, ComponentVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_componentwise_arithmetic() {
        let a = Vector([1.0, 2.0]);
        let b = Vector([3.0, -4.0]);
        assert_eq!(a + b, Vector([4.0, -2.0]));
        assert_eq!(a - b, Vector([-2.0, 6.0]));
        assert_eq!(-a, Vector([-1.0, -2.0]));
        assert_eq!(a * 2.0, Vector([2.0, 4.0]));
        assert_eq!(b / 2.0, Vector([1.5, -2.0]));
    }

    #[test]
    fn test_norm() {
        let v = Vector([3.0, 4.0]);
        assert_eq!(v.norm(), 5.0);
        assert_eq!(Vector::<f64, 3>::zero().norm(), 0.0);
    }

    #[test]
    fn test_accumulate_centroid() {
        let (position, mass) =
            accumulate_centroid(Vector([0.0, 0.0]), 1.0, Vector([1.0, 2.0]), 3.0);
        assert_eq!(mass, 4.0);
        assert_eq!(position, Vector([0.75, 1.5]));

        let mut p = Vector([0.0, 0.0]);
        let mut m = 1.0;
        accumulate_centroid_into(&mut p, &mut m, Vector([1.0, 2.0]), 3.0);
        assert_eq!((p, m), (position, mass));
    }

    #[test]
    fn test_serde_round_trip() {
        let v = Vector([0.25f64, -3.5, 17.0]);
        let bytes = bincode::serialize(&v).unwrap();
        let back: Vector<f64, 3> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(v, back);
    }
}
