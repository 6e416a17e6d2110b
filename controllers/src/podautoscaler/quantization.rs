//! Rounds a quantity up to a value reachable by repeatedly stepping from a
//! base, where the step itself grows geometrically. Used by callers that
//! want resource requests to land on a small set of "nice" values instead
//! of an arbitrary evaluator output.

use resources::quantity::Quantity;

const MAX_ITERATIONS: u32 = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct QuantizationRule {
    pub base: Quantity,
    pub step: Quantity,
    /// Multiplier applied to the step after each iteration. `0` or `1`
    /// disables growth (fixed-size steps).
    pub step_ratio: f64,
    /// Upper bound on the step size once `step_ratio` has grown it; `0`
    /// means unbounded.
    pub max_step: Quantity,
}

/// Advance `current = base, current += step (step *= step_ratio, capped at
/// max_step)` until `current >= input`. Preserves `input`'s format. Falls
/// back to returning `input` unchanged if the loop makes no progress
/// (`step < 1`) or exhausts its iteration budget.
pub fn quantize(input: Quantity, rule: &QuantizationRule) -> Quantity {
    let mut current = if rule.base.milli_value() > 0 {
        rule.base.milli_value()
    } else {
        0
    };
    let mut step = rule.step.milli_value();
    let target = input.milli_value();

    if current >= target {
        return Quantity::from_milli_with_format(current, input.format());
    }

    for _ in 0..MAX_ITERATIONS {
        if step < 1 {
            break;
        }
        current += step;
        if current >= target {
            return Quantity::from_milli_with_format(current, input.format());
        }
        if rule.step_ratio > 0.0 {
            step = ((step as f64) * rule.step_ratio) as i64;
            if rule.max_step.milli_value() > 0 && step > rule.max_step.milli_value() {
                step = rule.max_step.milli_value();
            }
        }
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use resources::quantity::Quantity;

    #[test]
    fn steps_up_to_next_multiple() {
        let rule = QuantizationRule {
            base: Quantity::parse("100M").unwrap(),
            step: Quantity::parse("100M").unwrap(),
            step_ratio: 1.0,
            max_step: Quantity::zero(),
        };
        let input = Quantity::parse("210M").unwrap();
        let out = quantize(input, &rule);
        assert_eq!(out.unscaled_value(), 300_000_000);
    }

    #[test]
    fn idempotent_on_already_quantized_input_with_fixed_step() {
        let rule = QuantizationRule {
            base: Quantity::parse("0").unwrap(),
            step: Quantity::parse("100M").unwrap(),
            step_ratio: 1.0,
            max_step: Quantity::zero(),
        };
        let already = quantize(Quantity::parse("250M").unwrap(), &rule);
        let again = quantize(already, &rule);
        assert_eq!(already.milli_value(), again.milli_value());
    }

    #[test]
    fn falls_back_to_input_when_step_is_zero() {
        let rule = QuantizationRule {
            base: Quantity::zero(),
            step: Quantity::zero(),
            step_ratio: 0.0,
            max_step: Quantity::zero(),
        };
        let input = Quantity::parse("123M").unwrap();
        let out = quantize(input, &rule);
        assert_eq!(out.milli_value(), input.milli_value());
    }
}
