use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::error::ClimateStressError;
use crate::loss::engine::LossDistribution;
use crate::numeric::{checked_add, checked_mul, to_finite_f64};
use crate::types::Money;
use crate::ClimateStressResult;

/// Draw `num_simulations` aggregate-loss samples from a scenario's stressed
/// parameters. Each loan defaults independently with probability equal to
/// its stressed PD; a default costs EAD × stressed LGD.
///
/// Randomness comes only from `rng`, so a seeded generator reproduces the
/// same samples.
pub fn simulate_aggregate_losses<R: Rng + ?Sized>(
    distribution: &LossDistribution,
    num_simulations: u32,
    rng: &mut R,
) -> ClimateStressResult<Vec<Money>> {
    if num_simulations == 0 {
        return Err(ClimateStressError::validation(
            "simulation.num_simulations",
            "must be at least 1",
        ));
    }

    let mut draws: Vec<(Bernoulli, Money)> = Vec::with_capacity(distribution.loan_losses.len());
    for l in &distribution.loan_losses {
        let context = format!("default probability of loan '{}'", l.loan_id);
        let p = to_finite_f64(l.pd_stressed, &context)?;
        let bernoulli = Bernoulli::new(p).map_err(|e| {
            ClimateStressError::numeric(format!("{context}: {e}"))
        })?;
        let loss_on_default = checked_mul(
            l.ead,
            l.lgd_stressed,
            &format!("loss on default of loan '{}'", l.loan_id),
        )?;
        draws.push((bernoulli, loss_on_default));
    }

    let mut samples = Vec::with_capacity(num_simulations as usize);
    for _ in 0..num_simulations {
        let mut total = Decimal::ZERO;
        for (bernoulli, loss_on_default) in &draws {
            if bernoulli.sample(rng) {
                total = checked_add(total, *loss_on_default, "simulated aggregate loss")?;
            }
        }
        samples.push(total);
    }

    tracing::debug!(
        scenario = %distribution.scenario,
        samples = samples.len(),
        "aggregate losses simulated"
    );
    Ok(samples)
}

/// Same as [`simulate_aggregate_losses`] with a `StdRng` seeded from `seed`.
pub fn simulate_with_seed(
    distribution: &LossDistribution,
    num_simulations: u32,
    seed: u64,
) -> ClimateStressResult<Vec<Money>> {
    let mut rng = StdRng::seed_from_u64(seed);
    simulate_aggregate_losses(distribution, num_simulations, &mut rng)
}
