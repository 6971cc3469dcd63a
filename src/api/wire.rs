//! JSON shapes of the swipe-terminal protocol.
//!
//! Field names are fixed by the terminal firmware: PascalCase bodies with a few
//! irregular spellings (`MenuID`, `VoiceID`, `faceinit`).

use crate::core::ConsumeOutcome;
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Swipe request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConsumeRequest {
    /// Terminal-side order reference
    pub order: String,
    /// Card number read by the terminal
    pub card_no: String,
    /// Echoed, not interpreted
    pub card_mode: i32,
    /// Echoed, not interpreted
    pub mode: i32,
    /// Echoed, not interpreted
    pub pay_type: i32,
    /// Amount on the terminal display
    pub amount: String,
    /// Selected menu lines, not priced here
    pub menus: Vec<MenuLine>,
}

/// One selected menu line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MenuLine {
    /// Menu item id
    #[serde(rename = "MenuID")]
    pub menu_id: String,
    /// Quantity as sent by the terminal
    #[serde(rename = "Count")]
    pub count: String,
}

/// Successful swipe reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConsumeResponse {
    /// 1 on success
    pub status: i32,
    /// Status line
    pub msg: String,
    /// Card-holder name
    pub name: String,
    /// Card number as swiped
    pub card_no: String,
    /// Always 0; entitlement is count based
    pub money: i32,
    /// Reserved, always 0
    pub subsidy: f64,
    /// Remaining entitlement
    pub times: i32,
    /// Reserved, always 0
    pub integral: f64,
    /// Reserved, always empty
    pub in_time: String,
    /// Reserved, always empty
    pub out_time: String,
    /// Reserved, always empty
    pub cumulative_time: String,
    /// Echoed amount
    pub amount: String,
    /// Voice prompt id
    #[serde(rename = "VoiceID")]
    pub voice_id: String,
    /// Spoken text
    pub text: String,
}

impl From<ConsumeOutcome> for ConsumeResponse {
    fn from(outcome: ConsumeOutcome) -> Self {
        Self {
            status: 1,
            msg: outcome.message,
            name: outcome.name,
            card_no: outcome.card_no,
            money: 0,
            subsidy: 0.0,
            times: outcome.remaining,
            integral: 0.0,
            in_time: String::new(),
            out_time: String::new(),
            cumulative_time: String::new(),
            amount: outcome.amount,
            voice_id: outcome.voice_id,
            text: outcome.text,
        }
    }
}

/// Bare status reply, used for rejections and acknowledgements.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReply {
    /// 1 on success, 0 on failure
    pub status: i32,
    /// Message for the terminal display
    pub msg: String,
}

impl StatusReply {
    /// `Status: 0` with a message for the terminal display.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            status: 0,
            msg: msg.into(),
        }
    }

    /// `Status: 1` acknowledgement.
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            status: 1,
            msg: msg.into(),
        }
    }
}

/// Clock synchronisation reply.
#[derive(Debug, Clone, Serialize)]
pub struct ServerTimeReply {
    /// Always 1
    #[serde(rename = "Status")]
    pub status: i32,
    /// Always empty
    #[serde(rename = "Msg")]
    pub msg: String,
    /// See [`format_server_time`]
    #[serde(rename = "Time")]
    pub time: String,
    /// Face recognition flags, unused
    pub faceinit: i32,
    /// Face recognition flags, unused
    #[serde(rename = "faceAction")]
    pub face_action: i32,
    /// Menu version, unused
    pub menuno: i32,
}

impl ServerTimeReply {
    /// Reply carrying `now`.
    #[must_use]
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            status: 1,
            msg: String::new(),
            time: format_server_time(now),
            faceinit: 0,
            face_action: 0,
            menuno: 0,
        }
    }
}

/// `yyyyMMddHHmmss` followed by the weekday digit, Monday = 0.
#[must_use]
pub fn format_server_time(now: NaiveDateTime) -> String {
    format!(
        "{}{}",
        now.format("%Y%m%d%H%M%S"),
        now.weekday().num_days_from_monday()
    )
}

/// Swipe recorded while the terminal was offline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
#[allow(missing_docs)]
pub struct OfflineRecord {
    pub device_number: i64,
    pub order: String,
    pub pay_type: i32,
    pub card_mode: i32,
    pub time: String,
    pub card_no: String,
    pub money: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::OutcomeKind;
    use crate::entities::Period;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_request_field_names() {
        let request: ConsumeRequest = serde_json::from_value(json!({
            "Order": "T-1",
            "CardNo": "1001",
            "CardMode": 1,
            "Mode": 0,
            "PayType": 2,
            "Amount": "12.50",
            "Menus": [{"MenuID": "7", "Count": "1"}]
        }))
        .unwrap();

        assert_eq!(request.card_no, "1001");
        assert_eq!(request.pay_type, 2);
        assert_eq!(request.menus[0].menu_id, "7");
    }

    #[test]
    fn test_request_tolerates_missing_echo_fields() {
        let request: ConsumeRequest = serde_json::from_value(json!({"CardNo": "1001"})).unwrap();
        assert!(request.menus.is_empty());
        assert_eq!(request.amount, "");
    }

    #[test]
    fn test_response_field_names() {
        let outcome = ConsumeOutcome {
            message: "consumed: lunch".to_string(),
            name: "Li".to_string(),
            card_no: "1001".to_string(),
            remaining: 4,
            amount: "0.00".to_string(),
            voice_id: "核销成功".to_string(),
            text: "Li: lunch consumed".to_string(),
            period: Period::Lunch,
            order_id: 3,
            kind: OutcomeKind::WalkIn,
        };
        let value = serde_json::to_value(ConsumeResponse::from(outcome)).unwrap();

        assert_eq!(value["Status"], 1);
        assert_eq!(value["Msg"], "consumed: lunch");
        assert_eq!(value["Times"], 4);
        assert_eq!(value["Money"], 0);
        assert_eq!(value["CumulativeTime"], "");
        assert_eq!(value["VoiceID"], "核销成功");
        assert_eq!(value["Text"], "Li: lunch consumed");
    }

    #[test]
    fn test_server_time_format() {
        // Wednesday
        let now = NaiveDate::from_ymd_opt(2025, 1, 8)
            .unwrap()
            .and_hms_opt(7, 5, 9)
            .unwrap();
        assert_eq!(format_server_time(now), "202501080705092");

        let value = serde_json::to_value(ServerTimeReply::at(now)).unwrap();
        assert_eq!(value["faceAction"], 0);
        assert_eq!(value["faceinit"], 0);
        assert_eq!(value["Time"], "202501080705092");

        let sunday = NaiveDate::from_ymd_opt(2025, 1, 12)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(format_server_time(sunday).ends_with('6'));
    }
}
