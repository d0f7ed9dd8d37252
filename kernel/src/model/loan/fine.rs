use crate::model::book::BookTag;
use chrono::{DateTime, Utc};

// 返却期限からの経過日数。期限内は 0
pub fn overdue_days(due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    at.signed_duration_since(due_date).num_days().max(0)
}

// 延滞金の計算。入力が同じなら常に同じ結果を返す純粋関数で、
// 返却処理とテストの双方がこの関数を唯一の算出元として使う
pub fn compute_fine(tag: BookTag, due_date: Option<DateTime<Utc>>, at: DateTime<Utc>) -> i64 {
    match due_date {
        Some(due) => overdue_days(due, at) * tag.fine_per_day(),
        // 返却期限の無い貸出（館内利用）に延滞金は発生しない
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn red_tag_three_days_late() {
        let returned = due() + Duration::days(3);
        assert_eq!(compute_fine(BookTag::Red, Some(due()), returned), 300);
    }

    #[test]
    fn yellow_tag_three_days_late() {
        let returned = due() + Duration::days(3);
        assert_eq!(compute_fine(BookTag::Yellow, Some(due()), returned), 150);
    }

    #[test]
    fn returned_on_time_is_free() {
        assert_eq!(compute_fine(BookTag::Red, Some(due()), due()), 0);
        let early = due() - Duration::days(2);
        assert_eq!(compute_fine(BookTag::Red, Some(due()), early), 0);
    }

    #[test]
    fn partial_days_round_down() {
        let returned = due() + Duration::days(2) + Duration::hours(23);
        assert_eq!(compute_fine(BookTag::Red, Some(due()), returned), 200);
    }

    #[test]
    fn no_due_date_never_accrues() {
        let way_later = due() + Duration::days(365);
        assert_eq!(compute_fine(BookTag::White, None, way_later), 0);
    }
}
