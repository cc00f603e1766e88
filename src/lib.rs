//! `lesim` - behavioral-conditioning experiment simulator
//!
//! Compiles phase scripts into stimulus-response state machines and runs
//! simulated subjects through them.
//!
//! ```
//! use lesim::phase::{Declarations, World, WorldStep};
//! use lesim::variables::Variables;
//! use rand::SeedableRng;
//!
//! let declarations = Declarations::new(["lever", "reward"], ["R", "R0"], Variables::new());
//! let registry = lesim::script::compile(
//!     "@phase fr stop:reward=1\nLEVER lever | R: REWARD | LEVER\nREWARD reward | LEVER\n",
//!     declarations,
//! )?;
//! let mut world = World::new(&registry, &["fr"])?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//!
//! let first = world.next_stimulus(None, &mut rng)?;
//! assert_eq!(first.line(), Some("LEVER"));
//! let second = world.next_stimulus(Some("R"), &mut rng)?;
//! assert_eq!(second.line(), Some("REWARD"));
//! assert!(matches!(world.next_stimulus(Some("R0"), &mut rng)?, WorldStep::End { .. }));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod expr;
pub mod observability;
pub mod phase;
pub mod script;
pub mod simulation;
pub mod variables;
