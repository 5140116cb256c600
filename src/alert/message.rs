/// Alert mail content
use crate::models::StatusFlag;

const HIGH_ALERT_COLOR: &str = "#D9534F";
const LOW_ALERT_COLOR: &str = "#5BC0DE";

#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Limits quoted in the alert text
#[derive(Debug, Clone, Copy)]
pub struct AlertLimits {
    pub high_temperature: f64,
    pub low_temperature: f64,
    pub current_ceiling: f64,
}

/// Build subject, plain-text and HTML bodies for an alert
///
/// # Arguments
/// * `status` - ALERT_LOW gets the low-temperature wording, anything else
///   the high temperature/current wording
/// * `temperature` - Temperature of the reading, °C
/// * `current` - Simulated current of the reading, A
/// * `timestamp` - Formatted time of the alert
pub fn build_alert(
    status: StatusFlag,
    temperature: f64,
    current: f64,
    timestamp: &str,
    limits: &AlertLimits,
) -> AlertMessage {
    let (reason, title, color) = match status {
        StatusFlag::AlertLow => (
            format!("LOW ALERT (T<{})", limits.low_temperature),
            "LOW TEMPERATURE ALERT",
            LOW_ALERT_COLOR,
        ),
        _ => (
            format!(
                "HIGH ALERT (T>{} or I_sim>{})",
                limits.high_temperature, limits.current_ceiling
            ),
            "HIGH TEMPERATURE / CURRENT ALERT",
            HIGH_ALERT_COLOR,
        ),
    };

    let subject = format!("CRITICAL ALERT: {}", reason);
    let temperature = format!("{:.1}°C", temperature);
    let current = format!("{:.2} A", current);

    let text_body = format!(
        "ATTENTION MAINTENANCE TEAM\n\
         An alert condition was detected by the inspection cell.\n\
         The robot stopped its cycle automatically and needs inspection.\n\
         ALERT DETAILS:\n\
         - Reason: {title}\n\
         - Date and time: {timestamp}\n\
         - Detected temperature: {temperature}\n\
         - Current (simulated): {current}\n"
    );

    let html_body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{subject}</title>
</head>
<body style="font-family: Arial, Helvetica, sans-serif; margin: 0; padding: 0; background-color: #f4f4f4;">
    <table width="100%" border="0" cellspacing="0" cellpadding="0">
        <tr>
            <td align="center" style="padding: 20px 0;">
                <table width="600" border="0" cellspacing="0" cellpadding="0" style="background-color: #ffffff; border: 1px solid #ddd; border-radius: 8px;">
                    <tr>
                        <td align="center" style="padding: 20px; background-color: {color}; color: #ffffff;">
                            <h1 style="margin: 0; font-size: 24px;">SYSTEM ALERT</h1>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 30px 40px;">
                            <h2 style="color: #333; font-size: 20px;">Attention Maintenance Team</h2>
                            <p style="color: #555; font-size: 16px;">An alert condition was detected by the inspection cell.</p>
                            <p style="color: #555; font-size: 16px;">The robot stopped its cycle automatically and needs inspection.</p>
                            <table width="100%" border="0" cellspacing="0" cellpadding="0" style="border: 1px solid #eee;">
                                <tr>
                                    <td style="padding: 12px; width: 40%;"><strong>Reason:</strong></td>
                                    <td style="padding: 12px; color: {color};"><strong>{title}</strong></td>
                                </tr>
                                <tr>
                                    <td style="padding: 12px;"><strong>Date and time:</strong></td>
                                    <td style="padding: 12px;">{timestamp}</td>
                                </tr>
                                <tr>
                                    <td style="padding: 12px;"><strong>Detected temperature:</strong></td>
                                    <td style="padding: 12px;">{temperature}</td>
                                </tr>
                                <tr>
                                    <td style="padding: 12px;"><strong>Current (simulated):</strong></td>
                                    <td style="padding: 12px;">{current}</td>
                                </tr>
                            </table>
                        </td>
                    </tr>
                    <tr>
                        <td align="center" style="padding: 20px; background-color: #f9f9f9; color: #999; font-size: 12px;">
                            Automatic message from the inspection cell. Please do not reply.
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>
"#
    );

    AlertMessage {
        subject,
        text_body,
        html_body,
    }
}
