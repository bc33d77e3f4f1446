//! Human readable wait-time messages.

use jiff::Timestamp;

/// Wait-time message for a denial, or `None` when the attempt is allowed.
///
/// Minutes until `reset_time` are rounded up; anything within a minute reads
/// as "shortly" and anything past an hour is reported in whole hours, rounded up.
#[must_use]
pub fn explain(is_allowed: bool, reset_time: Timestamp, now: Timestamp) -> Option<String> {
    if is_allowed {
        return None;
    }

    let seconds = reset_time.duration_since(now).as_secs();
    let minutes = seconds.div_euclid(60) + i64::from(seconds.rem_euclid(60) > 0);

    let message = if minutes <= 1 {
        "Too many sign-in requests. Please try again shortly.".to_string()
    } else if minutes <= 60 {
        format!("Too many sign-in requests. Please try again in {minutes} minutes.")
    } else {
        let hours = minutes.div_euclid(60) + i64::from(minutes.rem_euclid(60) > 0);

        format!("Too many sign-in requests. Please try again in {hours} hours.")
    };

    Some(message)
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;

    use super::*;

    fn in_secs(seconds: i64) -> (Timestamp, Timestamp) {
        let now = Timestamp::UNIX_EPOCH;

        (now + SignedDuration::from_secs(seconds), now)
    }

    #[test]
    fn allowed_verdicts_have_no_message() {
        let (reset, now) = in_secs(600);

        assert_eq!(explain(true, reset, now), None);
    }

    #[test]
    fn within_a_minute_reads_shortly() {
        for seconds in [-30, 0, 45, 60] {
            let (reset, now) = in_secs(seconds);

            assert_eq!(
                explain(false, reset, now).as_deref(),
                Some("Too many sign-in requests. Please try again shortly."),
                "{seconds}s should read as shortly"
            );
        }
    }

    #[test]
    fn minutes_round_up() {
        let (reset, now) = in_secs(14 * 60 + 1);

        assert_eq!(
            explain(false, reset, now).as_deref(),
            Some("Too many sign-in requests. Please try again in 15 minutes.")
        );
    }

    #[test]
    fn exactly_an_hour_is_still_minutes() {
        let (reset, now) = in_secs(60 * 60);

        assert_eq!(
            explain(false, reset, now).as_deref(),
            Some("Too many sign-in requests. Please try again in 60 minutes.")
        );
    }

    #[test]
    fn past_an_hour_rounds_up_to_hours() {
        let (reset, now) = in_secs(61 * 60);

        assert_eq!(
            explain(false, reset, now).as_deref(),
            Some("Too many sign-in requests. Please try again in 2 hours.")
        );
    }
}
