use crate::state::GameSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    /// Seconds left, clamped at zero.
    pub remaining: i64,
    pub expired:   bool,
}

/// Seconds left on the move timer at `now`, or `None` when the game is not
/// running.
///
/// Before the first move of an epoch `last_move_timestamp` is 0; the timer
/// is then measured from the moment the snapshot was fetched, so a freshly
/// started game never reads as expired.
pub fn time_remaining(snapshot: &GameSnapshot, now: i64) -> Option<Countdown> {
    if !snapshot.is_active {
        return None;
    }
    let start = if snapshot.last_move_timestamp > 0 {
        snapshot.last_move_timestamp
    } else {
        snapshot.fetched_at
    };
    let remaining = snapshot.timer_duration.saturating_sub(now.saturating_sub(start));
    if remaining <= 0 {
        Some(Countdown { remaining: 0, expired: true })
    } else {
        Some(Countdown { remaining, expired: false })
    }
}

/// `mm:ss`, minutes unbounded. Negative input renders as `00:00`.
pub fn format_countdown(seconds: i64) -> String {
    if seconds < 0 {
        return "00:00".to_string();
    }
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `--:--` when there is no running timer.
pub fn format_remaining(countdown: Option<Countdown>) -> String {
    countdown.map_or_else(|| "--:--".to_string(), |c| format_countdown(c.remaining))
}

/// Split seconds into (hours, minutes, seconds).
pub fn split_hms(seconds: i64) -> (i64, i64, i64) {
    let seconds = seconds.max(0);
    (seconds / 3_600, (seconds % 3_600) / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::game_account;

    fn snapshot(last_move: i64, timer: i64, fetched_at: i64) -> GameSnapshot {
        let data = game_account(|g| {
            g.last_move_timestamp = last_move;
            g.timer_duration = timer;
        });
        GameSnapshot::decode(&data, fetched_at).unwrap()
    }

    #[test]
    fn fresh_epoch_counts_from_fetch_time() {
        let fetched_at = 1_700_000_000;
        let s = snapshot(0, 600, fetched_at);
        assert_eq!(
            time_remaining(&s, fetched_at + 100),
            Some(Countdown { remaining: 500, expired: false })
        );
    }

    #[test]
    fn counts_down_from_last_move() {
        let s = snapshot(1_000, 600, 1_200);
        assert_eq!(
            time_remaining(&s, 1_300),
            Some(Countdown { remaining: 300, expired: false })
        );
        assert_eq!(
            time_remaining(&s, 1_600),
            Some(Countdown { remaining: 0, expired: true })
        );
        assert_eq!(
            time_remaining(&s, 9_999),
            Some(Countdown { remaining: 0, expired: true })
        );
    }

    #[test]
    fn extreme_timer_values_saturate() {
        let s = snapshot(1_000, i64::MAX, 1_000);
        // clock behind the last move
        assert_eq!(
            time_remaining(&s, 500),
            Some(Countdown { remaining: i64::MAX, expired: false })
        );

        let s = snapshot(1_000, i64::MIN, 1_000);
        assert_eq!(
            time_remaining(&s, 2_000),
            Some(Countdown { remaining: 0, expired: true })
        );
    }

    #[test]
    fn inactive_game_has_no_timer() {
        let data = game_account(|g| g.is_active = false);
        let s = GameSnapshot::decode(&data, 0).unwrap();
        assert_eq!(time_remaining(&s, 0), None);
        assert_eq!(format_remaining(time_remaining(&s, 0)), "--:--");
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(75), "01:15");
        assert_eq!(format_countdown(43_200), "720:00");
        assert_eq!(format_countdown(-5), "00:00");
        assert_eq!(split_hms(43_199), (11, 59, 59));
    }
}
