use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Local,
  NaiveDate,
  NaiveDateTime,
  TimeDelta,
  Timelike,
  Weekday
};
use regex::Regex;

/// Wire and storage format of a deadline, the same shape an HTML
/// `datetime-local` input produces.
pub const DEADLINE_FORMAT: &str =
  "%Y-%m-%dT%H:%M";

const DEADLINE_INPUT_FORMATS: [&str;
  5] = [
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%d %H:%M:%S"
];

/// Current local wall-clock time.
#[must_use]
pub fn local_now() -> NaiveDateTime {
  Local::now().naive_local()
}

/// Default deadline offered by the add form: now, to the minute.
#[must_use]
pub fn default_deadline(
  now: NaiveDateTime
) -> NaiveDateTime {
  truncate_to_minute(now)
}

fn truncate_to_minute(
  dt: NaiveDateTime
) -> NaiveDateTime {
  dt.with_second(0)
    .and_then(|dt| dt.with_nanosecond(0))
    .unwrap_or(dt)
}

#[must_use]
pub fn format_deadline(
  deadline: NaiveDateTime
) -> String {
  deadline
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

/// Upper-cased "MONTH YYYY" label of the month containing `date`.
#[must_use]
pub fn month_label(
  date: NaiveDate
) -> String {
  date
    .format("%B %Y")
    .to_string()
    .to_uppercase()
}

/// Parses a deadline as stored locally or returned by the API. RFC 3339
/// values are converted to local wall-clock time. Seconds are dropped so
/// the value survives a round trip through [`DEADLINE_FORMAT`].
pub fn parse_wire_deadline(
  raw: &str
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  let parsed = DEADLINE_INPUT_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(
        token, fmt
      )
      .ok()
    })
    .or_else(|| {
      DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|dt| {
          dt.with_timezone(&Local)
            .naive_local()
        })
    })?;

  Some(truncate_to_minute(parsed))
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_deadline(
  input: &str,
  now: NaiveDateTime
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "now" => {
      return Ok(default_deadline(now));
    }
    | "today" => {
      return Ok(midnight(now.date()));
    }
    | "tomorrow" => {
      return Ok(midnight(add_days(
        now.date(),
        1
      )));
    }
    | "yesterday" => {
      return Ok(midnight(add_days(
        now.date(),
        -1
      )));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      now.date(),
      target_weekday
    );
    return Ok(midnight(target_date));
  }

  if let Some((hour, minute)) =
    parse_clock_time(token)
  {
    let mut day = now.date();
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if candidate <= now {
      day = add_days(day, 1);
    }
    return day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct next \
           clock time candidate"
        )
      });
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "d" => TimeDelta::try_days(num),
      | "h" => TimeDelta::try_hours(num),
      | "m" => {
        TimeDelta::try_minutes(num)
      }
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    let base = default_deadline(now);
    let shifted =
      duration.and_then(|duration| {
        if sign == "-" {
          base.checked_sub_signed(
            duration
          )
        } else {
          base.checked_add_signed(
            duration
          )
        }
      });
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative deadline out of \
         range: {input}"
      )
    });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(midnight(date));
  }

  if let Some(parsed) =
    parse_wire_deadline(token)
  {
    return Ok(parsed);
  }

  Err(anyhow!(
    "unrecognized deadline: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     weekday names (e.g. friday), \
     clock times (e.g. 3:30pm or \
     15:30), +Nd/+Nh/+Nm, YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM, YYYY-MM-DD \
     HH:MM, RFC3339"
  })
}

/// Parses a calendar day: `YYYY-MM-DD`, `today`, `tomorrow` or
/// `yesterday`.
pub fn parse_day(
  input: &str,
  now: NaiveDateTime
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  match token
    .to_ascii_lowercase()
    .as_str()
  {
    | "today" => return Ok(now.date()),
    | "tomorrow" => {
      return Ok(add_days(
        now.date(),
        1
      ));
    }
    | "yesterday" => {
      return Ok(add_days(
        now.date(),
        -1
      ));
    }
    | _ => {}
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid day (expected \
       YYYY-MM-DD): {input}"
    )
  })
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(
  input: &str
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let (year, month) = token
    .split_once('-')
    .ok_or_else(|| {
      anyhow!(
        "invalid month (expected \
         YYYY-MM): {input}"
      )
    })?;
  let year: i32 = year
    .parse()
    .with_context(|| {
      format!("invalid year in {input}")
    })?;
  let month: u32 = month
    .parse()
    .with_context(|| {
      format!(
        "invalid month in {input}"
      )
    })?;

  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .ok_or_else(|| {
    anyhow!(
      "month out of range: {input}"
    )
  })
}

#[must_use]
pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

#[must_use]
pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  TimeDelta::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .unwrap_or(date)
}

/// Moves `date` by whole months, clamping the day to the target month's
/// length.
#[must_use]
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

fn midnight(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(chrono::NaiveTime::MIN)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  // A bare number is not a time; `3pm` is.
  let minute = match (
    captures.name("minute"),
    captures.name("ampm")
  ) {
    | (Some(minute), _) => {
      minute
        .as_str()
        .parse::<u32>()
        .ok()?
    }
    | (None, Some(_)) => 0,
    | (None, None) => return None
  };
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm_match
      .as_str()
      .to_ascii_lowercase()
      .as_str()
    {
      | "am" => raw_hour % 12,
      | "pm" => raw_hour % 12 + 12,
      | _ => return None
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}


pub mod deadline_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::{
    DEADLINE_FORMAT,
    parse_wire_deadline
  };

  pub fn serialize<S>(
    dt: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt
        .format(DEADLINE_FORMAT)
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    parse_wire_deadline(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid deadline: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          super::super::parse_wire_deadline(&raw)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid deadline: {raw}"
                )
              )
            })
        }
        | None => Ok(None)
      }
    }
  }
}
