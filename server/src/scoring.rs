//! Score computation and the two ranking orders.
//!
//! These are pure functions over the per-game score list. The input order is
//! the players' join order and both sorts are stable, so ties (including the
//! all-zero round where nobody claimed a word) resolve deterministically by
//! join order.

use shared::Score;

/// Words per minute: `points × 60000 / elapsed_millis`. A zero elapsed time
/// is clamped to one millisecond so a degenerate instant round cannot divide
/// by zero.
pub fn compute_speed(points: u32, elapsed_millis: u64) -> f64 {
    points as f64 * 60000.0 / elapsed_millis.max(1) as f64
}

/// Round ranking: most points first, then highest speed.
pub fn sorted_round_scores(scores: &[Score]) -> Vec<Score> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.speed.total_cmp(&a.speed))
    });
    sorted
}

/// Game ranking: most victories first, then highest best speed, then the
/// earliest latest-victory timestamp.
pub fn sorted_game_scores(scores: &[Score]) -> Vec<Score> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| {
        b.victories
            .cmp(&a.victories)
            .then_with(|| b.best_speed.total_cmp(&a.best_speed))
            .then_with(|| a.latest_victory_timestamp.cmp(&b.latest_victory_timestamp))
    });
    sorted
}

/// True when some player has accumulated enough victories to end the game.
pub fn is_game_over(game_scores: &[Score], rounds: u32) -> bool {
    game_scores
        .first()
        .map(|s| s.victories >= rounds)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn score(name: &str, points: u32, speed: f64) -> Score {
        let mut s = Score::new(name);
        s.points = points;
        s.speed = speed;
        s
    }

    #[test]
    fn test_speed_formula() {
        // 4 words in 30 seconds is 8 words per minute.
        assert_approx_eq!(compute_speed(4, 30_000), 8.0, 1e-9);
        // 1 word in 2 minutes is 0.5 words per minute.
        assert_approx_eq!(compute_speed(1, 120_000), 0.5, 1e-9);
        assert_eq!(compute_speed(0, 30_000), 0.0);
    }

    #[test]
    fn test_speed_zero_elapsed_does_not_divide_by_zero() {
        let speed = compute_speed(3, 0);
        assert!(speed.is_finite());
    }

    #[test]
    fn test_round_order_points_then_speed() {
        let scores = vec![
            score("slow", 3, 10.0),
            score("fast", 3, 20.0),
            score("top", 5, 5.0),
        ];

        let sorted = sorted_round_scores(&scores);
        let names: Vec<&str> = sorted.iter().map(|s| s.user_name.as_str()).collect();
        assert_eq!(names, vec!["top", "fast", "slow"]);
    }

    #[test]
    fn test_round_order_all_zero_keeps_join_order() {
        let scores = vec![
            score("first", 0, 0.0),
            score("second", 0, 0.0),
            score("third", 0, 0.0),
        ];

        let sorted = sorted_round_scores(&scores);
        let names: Vec<&str> = sorted.iter().map(|s| s.user_name.as_str()).collect();
        // Stable sort: the deterministic winner of an empty round is the
        // earliest joiner.
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_game_order_victories_best_speed_timestamp() {
        let mut a = Score::new("a");
        a.victories = 2;
        a.best_speed = 30.0;
        a.latest_victory_timestamp = 5000;

        let mut b = Score::new("b");
        b.victories = 2;
        b.best_speed = 30.0;
        b.latest_victory_timestamp = 4000;

        let mut c = Score::new("c");
        c.victories = 2;
        c.best_speed = 40.0;
        c.latest_victory_timestamp = 9000;

        let mut d = Score::new("d");
        d.victories = 3;
        d.best_speed = 1.0;

        let sorted = sorted_game_scores(&[a, b, c, d]);
        let names: Vec<&str> = sorted.iter().map(|s| s.user_name.as_str()).collect();
        // d leads on victories; c on best speed; b beats a on the earlier
        // latest victory.
        assert_eq!(names, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_game_over_threshold() {
        let mut winner = Score::new("w");
        winner.victories = 3;
        let other = Score::new("o");

        let sorted = sorted_game_scores(&[other, winner]);
        assert!(is_game_over(&sorted, 3));
        assert!(!is_game_over(&sorted, 4));
        assert!(!is_game_over(&[], 1));
    }
}
