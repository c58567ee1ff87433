//! One-off weighted draw
//!
//! Runs the same selector the scheduler uses at finalize, without any
//! entity or store. Handy for auditing a draw offline with a known seed.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use raffler_core::ActorId;

use crate::cli::args::{DrawArgs, OutputFormat};
use crate::error::RafflerError;
use crate::selector;

/// Draw winners from the entrants given on the command line.
///
/// # Errors
///
/// Returns a usage error if `--winners` is zero.
pub fn run(args: &DrawArgs) -> Result<(), RafflerError> {
    if args.winners == 0 {
        return Err(RafflerError::Usage("--winners must be at least 1".to_string()));
    }

    let winners = draw(args);

    match args.format {
        OutputFormat::Human => {
            for (place, winner) in winners.iter().enumerate() {
                println!("{}. {winner}", place + 1);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&winners)?);
        }
    }
    Ok(())
}

fn draw(args: &DrawArgs) -> Vec<ActorId> {
    let entrants: Vec<ActorId> = args
        .entrants
        .iter()
        .map(|(name, _)| ActorId::new(name.as_str()))
        .collect();
    let weights: BTreeMap<ActorId, u32> = args
        .entrants
        .iter()
        .map(|(name, weight)| (ActorId::new(name.as_str()), *weight))
        .collect();

    let mut rng = args
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    selector::select_winners(&entrants, &weights, args.winners, &mut rng)
}
