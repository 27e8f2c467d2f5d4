//! # Resilience Module
//!
//! Fault isolation for outbound probes. The caption service's fresh-URL lookup
//! runs behind a [`CircuitBreaker`] so a degraded collaborator fails fast
//! instead of stalling every post-processing task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reelflow_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("caption_probe", CircuitBreakerConfig::default());
//! let url = breaker
//!     .call(|| async { Ok::<_, std::io::Error>("https://cdn.example/video.mp4") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, CircuitState,
};
