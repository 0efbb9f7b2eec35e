//! Shared test utilities for the phrase recommendation crates
//!
//! - `TestDatabase`: pgvector PostgreSQL container with migrations applied (feature: "postgres")
//! - [`FakeStarSpace`]: shell-script stand-ins for the StarSpace trainer and embedder
//! - [`TestDataBuilder`]: deterministic item names and vectors
//! - [`assertions`]: vector comparison helpers
//!
//! ```rust,no_run
//! use test_utils::{FakeStarSpace, TestDataBuilder};
//!
//! let builder = TestDataBuilder::from_test_name("reindex_replaces_rows");
//! let fake = FakeStarSpace::new(4)
//!     .with_item(&builder.item("lamp"), &builder.unit_vector(4, 0));
//! fake.install_model();
//! ```

#[cfg(feature = "postgres")]
mod postgres;
mod starspace;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;
pub use starspace::FakeStarSpace;

/// Deterministic test data derived from a seed.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from the test name so each test gets its own stable data.
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_query_limit");
    /// assert_eq!(builder.item("lamp"), TestDataBuilder::from_test_name("test_query_limit").item("lamp"));
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Catalog item key unique to this builder.
    pub fn item(&self, name: &str) -> String {
        format!("item-{}-{}", name, self.seed % 100_000)
    }

    /// `dim` zeros with 1.0 at `axis`.
    pub fn unit_vector(&self, dim: usize, axis: usize) -> Vec<f32> {
        let mut vector = vec![0.0; dim];
        vector[axis % dim] = 1.0;
        vector
    }

    /// Pseudo-random vector in [-1, 1), stable for a given seed and salt.
    pub fn vector(&self, dim: usize, salt: u64) -> Vec<f32> {
        let mut state = self.seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (0..dim)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert two vectors are element-wise equal within `epsilon`.
    pub fn assert_vec_approx_eq(actual: &[f32], expected: &[f32], epsilon: f32) {
        assert_eq!(
            actual.len(),
            expected.len(),
            "vector length: expected {}, got {}",
            expected.len(),
            actual.len()
        );
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() <= epsilon,
                "component {}: expected {}, got {}",
                i,
                e,
                a
            );
        }
    }

    /// Assert an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let a = TestDataBuilder::new(42);
        let b = TestDataBuilder::new(42);

        assert_eq!(a.item("lamp"), b.item("lamp"));
        assert_eq!(a.vector(8, 1), b.vector(8, 1));
    }

    #[test]
    fn test_data_builder_different_names() {
        let a = TestDataBuilder::from_test_name("test1");
        let b = TestDataBuilder::from_test_name("test2");

        assert_ne!(a.vector(8, 0), b.vector(8, 0));
    }

    #[test]
    fn test_vector_range_and_unit_vector() {
        let builder = TestDataBuilder::new(7);
        let v = builder.vector(50, 3);
        assert_eq!(v.len(), 50);
        assert!(v.iter().all(|x| (-1.0..1.0).contains(x)));

        assert_eq!(builder.unit_vector(3, 1), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_assert_vec_approx_eq() {
        assertions::assert_vec_approx_eq(&[0.5, 1.25], &[0.5, 1.250_000_1], 1e-5);
    }
}
