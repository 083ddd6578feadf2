//! 営業時間ゲート
//!
//! 対象タイムゾーンの現地時刻が `[open_hour, close_hour)` かつ許可曜日のときのみ実行を許可する。

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Timelike, Weekday};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    open_hour: u32,
    close_hour: u32,
    allowed_weekdays: Vec<Weekday>,
    offset: FixedOffset,
}

impl TimeWindow {
    pub fn new(
        open_hour: u32,
        close_hour: u32,
        allowed_weekdays: Vec<Weekday>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            open_hour,
            close_hour,
            allowed_weekdays,
            offset,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 実行可否を判定（副作用なし）
    pub fn is_allowed<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let local = now.with_timezone(&self.offset);
        let hour = local.hour();
        self.allowed_weekdays.contains(&local.weekday())
            && hour >= self.open_hour
            && hour < self.close_hour
    }
}
