// Cron expression validation and next fire time calculation

use crate::errors::ConfigurationError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// A validated cron expression bound to a timezone
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronTrigger {
    /// Parse a 5-field (minute precision) or 6-field (second precision) expression
    ///
    /// Day-of-week numbers follow the crontab convention, 0 or 7 is Sunday.
    /// Whether the schedule still fires is left to the caller's clock.
    pub fn parse(expression: &str, timezone: Tz) -> Result<Self, ConfigurationError> {
        let normalized = normalize_expression(expression)?;
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| invalid(expression, e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|next| next.with_timezone(&Utc))
    }
}

fn invalid(expression: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

/// Rewrite an expression into the six-field form the `cron` crate parses
pub fn normalize_expression(expression: &str) -> Result<String, ConfigurationError> {
    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();

    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => {
            return Err(invalid(
                expression,
                format!("expected 5 or 6 fields, got {}", n),
            ))
        }
    }

    fields[5] = translate_day_of_week(&fields[5]);
    Ok(fields.join(" "))
}

// crontab counts Sunday as 0 (or 7), the cron crate as 1
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_day_of_week_part)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_day_of_week_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };

    let translated = match range.split_once('-') {
        Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
            (Ok(start), Ok(7)) if start > 0 && step.is_none() => {
                // wraps onto Sunday
                return format!("{}-7,1", start + 1);
            }
            (Ok(_), Ok(7)) => "1-7".to_string(),
            (Ok(start), Ok(end)) if end < 7 => format!("{}-{}", start + 1, end + 1),
            _ => range.to_string(),
        },
        None => match range.parse::<u32>() {
            Ok(day) if day <= 7 => (day % 7 + 1).to_string(),
            _ => range.to_string(),
        },
    };

    match step {
        Some(step) => format!("{}/{}", translated, step),
        None => translated,
    }
}
