//! # Voxel Server Entry Point
//!
//! Calls into the library's `run()` function.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -- --world demo --seed 12345
//! ```

fn main() -> anyhow::Result<()> {
    voxel_server::run()
}
