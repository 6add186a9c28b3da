//! Display helpers for list cells and pickers.

use entity::action::{ActionType, Stage};

/// Stage text as the pipeline list shows it. The board uses
/// [`crate::history::StageLabel`] instead, which calls `propose`
/// "Negotiation".
pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Contact => "Contact",
        Stage::Lead => "Lead",
        Stage::Propose => "Propose",
        Stage::ClosedWon => "Closed Won",
        Stage::ClosedLost => "Closed Lost",
    }
}

pub fn action_type_label(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Email => "Email",
        ActionType::Call => "Call",
        ActionType::Meeting => "Meeting",
    }
}

/// Groups the digits of a phone number with hyphens. Numbers that already
/// contain a hyphen, or have an unexpected digit count, are returned as-is.
pub fn format_phone_number(phone: Option<&str>) -> String {
    let phone = match phone {
        None | Some("") | Some("-") => return "-".to_owned(),
        Some(phone) => phone,
    };
    if phone.contains('-') {
        return phone.to_owned();
    }

    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let (head, middle) = match digits.len() {
        10 | 11 => (3, 7),
        9 => (2, 6),
        8 => (2, 5),
        _ => return phone.to_owned(),
    };
    format!(
        "{}-{}-{}",
        &digits[..head],
        &digits[head..middle],
        &digits[middle..]
    )
}

/// `"client x campaign"`, or the client alone when there is no campaign.
pub fn display_name(client_name: &str, campaign: Option<&str>) -> String {
    match campaign.filter(|campaign| !campaign.is_empty()) {
        Some(campaign) => format!("{client_name} x {campaign}"),
        None => client_name.to_owned(),
    }
}

/// Budget cell text: thousands separators, or "-" for zero and missing.
pub fn format_budget(budget: Option<i64>) -> String {
    match budget {
        Some(value) if value > 0 => {
            let digits = value.to_string();
            let mut out = String::with_capacity(digits.len() + digits.len() / 3);
            for (index, ch) in digits.chars().enumerate() {
                if index > 0 && (digits.len() - index) % 3 == 0 {
                    out.push(',');
                }
                out.push(ch);
            }
            out
        }
        _ => "-".to_owned(),
    }
}
