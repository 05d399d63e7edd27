//! Cache key builders. Keys are `<namespace>:<artifact>:<dimensions...>` so
//! each artifact kind and query shape gets its own slot.

use chrono::NaiveDate;

const NAMESPACE: &str = "lb:v1";

fn date_part(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "latest".to_string())
}

pub fn leaderboard(date: Option<NaiveDate>, limit: u32) -> String {
    format!("{NAMESPACE}:leaderboard:{}:{limit}", date_part(date))
}

pub fn item_detail(item_id: &str, date: Option<NaiveDate>) -> String {
    format!("{NAMESPACE}:item:{item_id}:{}", date_part(date))
}

pub fn time_series(item_id: &str, days: u32, end: Option<NaiveDate>) -> String {
    format!("{NAMESPACE}:series:{item_id}:{days}:{}", date_part(end))
}

pub fn sparkline(item_id: &str, days: u32, end: Option<NaiveDate>) -> String {
    format!("{NAMESPACE}:sparkline:{item_id}:{days}:{}", date_part(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_artifact_and_dimensions() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(leaderboard(Some(d), 50), "lb:v1:leaderboard:2024-01-09:50");
        assert_eq!(leaderboard(None, 10), "lb:v1:leaderboard:latest:10");
        assert_eq!(item_detail("box-7", None), "lb:v1:item:box-7:latest");
        assert_ne!(time_series("box-7", 30, Some(d)), sparkline("box-7", 30, Some(d)));
        assert_eq!(time_series("box-7", 7, None), "lb:v1:series:box-7:7:latest");
    }
}
