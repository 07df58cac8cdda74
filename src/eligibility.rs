use crate::models::{SponsorRating, VisaConfidence};
use crate::occupation::Occupation;

/// General salary threshold for a Skilled Worker visa, annual GBP.
pub const GENERAL_THRESHOLD: i64 = 41_700;
/// Discounted general threshold available to new entrants.
pub const NEW_ENTRANT_GENERAL_THRESHOLD: i64 = 33_400;

/// Outcome of looking the employer up on the sponsor register.
#[derive(Debug, Clone)]
pub enum SponsorCheck {
    /// The company field was empty or a placeholder; nothing to look up.
    Unidentified,
    /// A real name that is not on the register.
    NotListed,
    Listed {
        display_name: String,
        rating: Option<SponsorRating>,
    },
}

/// Pure verdict over (sponsor check, occupation, parsed salary). No hidden
/// state; recomputed fresh each pass from the current registry snapshot.
pub fn evaluate(
    check: &SponsorCheck,
    occupation: Option<&Occupation>,
    salary: Option<i64>,
) -> (VisaConfidence, String) {
    let (name, _rating) = match check {
        SponsorCheck::Unidentified => {
            return (
                VisaConfidence::Unknown,
                "Employer could not be identified, so sponsorship cannot be assessed.".to_string(),
            );
        }
        SponsorCheck::NotListed => {
            return (
                VisaConfidence::Red,
                "Employer is not on the register of licensed sponsors.".to_string(),
            );
        }
        SponsorCheck::Listed {
            display_name,
            rating,
        } => (display_name, rating),
    };

    let threshold = match occupation {
        Some(occ) => occ.new_entrant_rate.max(GENERAL_THRESHOLD),
        None => GENERAL_THRESHOLD,
    };

    let Some(salary) = salary else {
        return (
            VisaConfidence::Yellow,
            format!(
                "{name} is a licensed sponsor, but no salary is stated; confirm the role pays at least £{threshold}."
            ),
        );
    };

    if salary >= threshold {
        let basis = match occupation {
            Some(occ) => format!("threshold for {}", occ.label),
            None => "general salary threshold".to_string(),
        };
        (
            VisaConfidence::Green,
            format!("{name} is a licensed sponsor and £{salary} meets the {basis} of £{threshold}."),
        )
    } else {
        let shortfall = threshold - salary;
        (
            VisaConfidence::Yellow,
            format!(
                "{name} is a licensed sponsor, but £{salary} is £{shortfall} short of the £{threshold} requirement; the £{NEW_ENTRANT_GENERAL_THRESHOLD} new-entrant threshold may still apply."
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupation::infer_occupation;

    fn listed(name: &str) -> SponsorCheck {
        SponsorCheck::Listed {
            display_name: name.to_string(),
            rating: Some(SponsorRating::A),
        }
    }

    #[test]
    fn test_not_listed_is_red_regardless_of_salary() {
        for salary in [None, Some(30_000), Some(90_000)] {
            let (confidence, reason) = evaluate(&SponsorCheck::NotListed, None, salary);
            assert_eq!(confidence, VisaConfidence::Red);
            assert!(reason.contains("not on the register"));
        }
    }

    #[test]
    fn test_unidentified_is_unknown() {
        let (confidence, _) = evaluate(&SponsorCheck::Unidentified, None, Some(50_000));
        assert_eq!(confidence, VisaConfidence::Unknown);
    }

    #[test]
    fn test_meets_general_threshold_exactly() {
        let (confidence, reason) = evaluate(&listed("Acme"), None, Some(41_700));
        assert_eq!(confidence, VisaConfidence::Green);
        assert!(reason.contains("general salary threshold"));
    }

    #[test]
    fn test_no_salary_is_yellow_naming_threshold() {
        let (confidence, reason) = evaluate(&listed("Acme"), None, None);
        assert_eq!(confidence, VisaConfidence::Yellow);
        assert!(reason.contains("£41700"));
    }

    #[test]
    fn test_shortfall_is_yellow_with_new_entrant_path() {
        let (confidence, reason) = evaluate(&listed("Acme"), None, Some(38_000));
        assert_eq!(confidence, VisaConfidence::Yellow);
        assert!(reason.contains("£3700 short"));
        assert!(reason.contains("£33400"));
    }

    #[test]
    fn test_occupation_threshold_is_max_of_band_and_general() {
        // Environment professionals: new-entrant rate below the general
        // threshold, so £41,700 governs.
        let occ = infer_occupation("Sustainability Consultant");
        let (confidence, reason) = evaluate(&listed("Acme"), occ, Some(50_000));
        assert_eq!(confidence, VisaConfidence::Green);
        assert!(reason.contains("Environment professionals"));

        let (confidence, _) = evaluate(&listed("Acme"), occ, Some(40_000));
        assert_eq!(confidence, VisaConfidence::Yellow);

        // Director-level codes carry a new-entrant rate above the general
        // threshold, so the band governs instead.
        let senior = infer_occupation("Sustainability Director");
        let (confidence, reason) = evaluate(&listed("Acme"), senior, Some(45_000));
        assert_eq!(confidence, VisaConfidence::Yellow);
        assert!(reason.contains("£51800"));
    }
}
