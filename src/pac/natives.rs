// src/pac/natives.rs
//! Host functions exposed to PAC scripts.
//!
//! DNS, address and time helpers live here. The pure string helpers
//! (`dnsDomainIs`, `isInNet`, ...) are defined by the bootstrap script in
//! terms of these.

use boa_engine::{Context, JsArgs, JsResult, JsString, JsValue};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use regex::Regex;
use std::fmt;
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};

/// Signature of a function callable from a PAC script.
pub type NativeFn = fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>;

/// One entry of a [`NativeTable`].
#[derive(Clone, Copy)]
pub struct NativeEntry {
    pub name: &'static str,
    pub length: usize,
    pub function: NativeFn,
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("name", &self.name)
            .field("length", &self.length)
            .finish()
    }
}

/// Ordered, name-keyed set of host functions registered into every session.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    entries: Vec<NativeEntry>,
}

impl NativeTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// DNS, address and time helpers for standard PAC scripts.
    pub fn standard() -> Self {
        Self::empty()
            .with("dnsResolve", 1, dns_resolve)
            .with("dnsResolveEx", 1, dns_resolve_ex)
            .with("isResolvable", 1, is_resolvable)
            .with("isResolvableEx", 1, is_resolvable_ex)
            .with("myIpAddress", 0, my_ip_address)
            .with("myIpAddressEx", 0, my_ip_address_ex)
            .with("isInNetEx", 2, is_in_net_ex)
            .with("shExpMatch", 2, sh_exp_match)
            .with("weekdayRange", 3, weekday_range)
            .with("dateRange", 7, date_range)
            .with("timeRange", 7, time_range)
    }

    /// Append a function. Names are checked when a session registers the table.
    pub fn with(mut self, name: &'static str, length: usize, function: NativeFn) -> Self {
        self.entries.push(NativeEntry {
            name,
            length,
            function,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &NativeEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn string_arg(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<String> {
    Ok(args.get_or_undefined(index).to_string(ctx)?.to_std_string_escaped())
}

fn string_value(s: String) -> JsValue {
    JsValue::from(JsString::from(s))
}

// dnsResolve(host)
fn dns_resolve(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let host = string_arg(args, 0, ctx)?;
    Ok(resolve_host(&host)
        .into_iter()
        .find(IpAddr::is_ipv4)
        .map(|ip| string_value(ip.to_string()))
        .unwrap_or_else(JsValue::null))
}

// dnsResolveEx(host)
fn dns_resolve_ex(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let host = string_arg(args, 0, ctx)?;
    let addrs: Vec<String> = resolve_host(&host).iter().map(IpAddr::to_string).collect();
    Ok(string_value(addrs.join(";")))
}

// isResolvable(host)
fn is_resolvable(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let host = string_arg(args, 0, ctx)?;
    Ok(resolve_host(&host).iter().any(IpAddr::is_ipv4).into())
}

// isResolvableEx(host)
fn is_resolvable_ex(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let host = string_arg(args, 0, ctx)?;
    Ok((!resolve_host(&host).is_empty()).into())
}

// myIpAddress()
fn my_ip_address(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let ip = local_address("0.0.0.0:0", "8.8.8.8:53").unwrap_or_else(|| "127.0.0.1".to_string());
    Ok(string_value(ip))
}

// myIpAddressEx()
fn my_ip_address_ex(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    let addrs: Vec<String> = [
        local_address("0.0.0.0:0", "8.8.8.8:53"),
        local_address("[::]:0", "[2001:4860:4860::8888]:53"),
    ]
    .into_iter()
    .flatten()
    .collect();
    Ok(string_value(addrs.join(";")))
}

// isInNetEx(ip, "prefix/len")
fn is_in_net_ex(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let ip = string_arg(args, 0, ctx)?;
    let prefix = string_arg(args, 1, ctx)?;
    Ok(ip
        .parse::<IpAddr>()
        .map(|ip| in_prefix(ip, &prefix))
        .unwrap_or(false)
        .into())
}

// shExpMatch(str, glob)
fn sh_exp_match(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let value = string_arg(args, 0, ctx)?;
    let pattern = string_arg(args, 1, ctx)?;
    Ok(glob_match(&value, &pattern).into())
}

// weekdayRange(wd1, [wd2], ["GMT"])
fn weekday_range(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let (values, gmt) = time_args(args, ctx)?;
    let days: Vec<String> = values.iter().map(TimeArg::as_text).collect();
    let today = now(gmt).weekday();
    let result = match days.as_slice() {
        [day] => weekday_in_range(today, day, day),
        [first, last] => weekday_in_range(today, first, last),
        _ => false,
    };
    Ok(result.into())
}

// dateRange(...)
fn date_range(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let (values, gmt) = time_args(args, ctx)?;
    let parts: Option<Vec<DatePart>> = values.iter().map(TimeArg::as_date_part).collect();
    Ok(parts
        .map(|parts| date_in_range(now(gmt).date(), &parts))
        .unwrap_or(false)
        .into())
}

// timeRange(...)
fn time_range(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let (values, gmt) = time_args(args, ctx)?;
    let numbers: Option<Vec<u32>> = values.iter().map(TimeArg::as_number).collect();
    Ok(numbers
        .map(|numbers| time_in_range(now(gmt).time(), &numbers))
        .unwrap_or(false)
        .into())
}

fn resolve_host(host: &str) -> Vec<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return vec![ip];
    }
    (host, 0)
        .to_socket_addrs()
        .map(|addrs| addrs.map(|addr| addr.ip()).collect())
        .unwrap_or_default()
}

fn local_address(bind: &str, probe: &str) -> Option<String> {
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(probe).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

pub(crate) fn in_prefix(ip: IpAddr, prefix: &str) -> bool {
    let Some((network, len)) = prefix.trim().split_once('/') else {
        return false;
    };
    let (Ok(network), Ok(len)) = (network.parse::<IpAddr>(), len.parse::<u32>()) else {
        return false;
    };
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(network)) if len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - len).unwrap_or(0);
            u32::from(ip) & mask == u32::from(network) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(network)) if len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - len).unwrap_or(0);
            u128::from(ip) & mask == u128::from(network) & mask
        }
        _ => false,
    }
}

/// Shell-style match: `*` is any run, `?` any single character.
pub(crate) fn glob_match(value: &str, pattern: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');
    Regex::new(&regex)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
enum TimeArg {
    Number(i64),
    Text(String),
}

impl TimeArg {
    fn as_text(&self) -> String {
        match self {
            TimeArg::Number(n) => n.to_string(),
            TimeArg::Text(s) => s.to_ascii_uppercase(),
        }
    }

    fn as_number(&self) -> Option<u32> {
        match self {
            TimeArg::Number(n) => u32::try_from(*n).ok(),
            TimeArg::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_date_part(&self) -> Option<DatePart> {
        if let Some(month) = month_index(&self.as_text()) {
            return Some(DatePart::Month(month));
        }
        match self.as_number()? {
            day @ 1..=31 => Some(DatePart::Day(day)),
            year if year > 31 => i32::try_from(year).ok().map(DatePart::Year),
            _ => None,
        }
    }
}

/// Splits off a trailing `"GMT"` argument.
fn time_args(args: &[JsValue], ctx: &mut Context) -> JsResult<(Vec<TimeArg>, bool)> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        if arg.is_undefined() {
            continue;
        }
        if arg.is_number() {
            values.push(TimeArg::Number(arg.to_number(ctx)? as i64));
        } else {
            values.push(TimeArg::Text(arg.to_string(ctx)?.to_std_string_escaped()));
        }
    }
    let gmt = matches!(values.last(), Some(TimeArg::Text(s)) if s.eq_ignore_ascii_case("GMT"));
    if gmt {
        values.pop();
    }
    Ok((values, gmt))
}

fn now(gmt: bool) -> NaiveDateTime {
    if gmt {
        Utc::now().naive_utc()
    } else {
        Local::now().naive_local()
    }
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn month_index(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32)
}

/// Inclusive, wrapping over the week end (`FRI`..`MON`).
pub(crate) fn weekday_in_range(today: Weekday, first: &str, last: &str) -> bool {
    let position = |name: &str| WEEKDAYS.iter().position(|d| d.eq_ignore_ascii_case(name));
    let (Some(start), Some(end)) = (position(first), position(last)) else {
        return false;
    };
    let current = today.num_days_from_sunday() as usize;
    if start <= end {
        start <= current && current <= end
    } else {
        current >= start || current <= end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatePart {
    Day(u32),
    /// Zero-based.
    Month(u32),
    Year(i32),
}

impl DatePart {
    fn rank(&self) -> u8 {
        match self {
            DatePart::Year(_) => 0,
            DatePart::Month(_) => 1,
            DatePart::Day(_) => 2,
        }
    }
}

/// Project `date` and `bound` onto the fields `bound` names, most significant first.
fn date_key(date: NaiveDate, bound: &[DatePart]) -> (Vec<i64>, Vec<i64>) {
    let mut sorted = bound.to_vec();
    sorted.sort_by_key(DatePart::rank);
    let mut bound_key = Vec::with_capacity(sorted.len());
    let mut date_key = Vec::with_capacity(sorted.len());
    for part in &sorted {
        let (b, d) = match part {
            DatePart::Year(y) => (i64::from(*y), i64::from(date.year())),
            DatePart::Month(m) => (i64::from(*m), i64::from(date.month0())),
            DatePart::Day(day) => (i64::from(*day), i64::from(date.day())),
        };
        bound_key.push(b);
        date_key.push(d);
    }
    (bound_key, date_key)
}

pub(crate) fn date_in_range(today: NaiveDate, parts: &[DatePart]) -> bool {
    match parts {
        [DatePart::Day(d)] => today.day() == *d,
        [DatePart::Month(m)] => today.month0() == *m,
        [DatePart::Year(y)] => today.year() == *y,
        _ if parts.len() % 2 == 0 && parts.len() <= 6 => {
            let (first, last) = parts.split_at(parts.len() / 2);
            let kinds = |half: &[DatePart]| {
                let mut ranks: Vec<u8> = half.iter().map(DatePart::rank).collect();
                ranks.sort_unstable();
                ranks
            };
            if kinds(first) != kinds(last) {
                return false;
            }
            let (start, current) = date_key(today, first);
            let (end, _) = date_key(today, last);
            if start <= end {
                start <= current && current <= end
            } else {
                current >= start || current <= end
            }
        }
        _ => false,
    }
}

/// `[h]`, `[h1, h2]`, `[h1, m1, h2, m2]` or `[h1, m1, s1, h2, m2, s2]`;
/// bounds inclusive, wrapping past midnight.
pub(crate) fn time_in_range(now: NaiveTime, numbers: &[u32]) -> bool {
    let seconds = |h: u32, m: u32, s: u32| {
        (h <= 23 && m <= 59 && s <= 59).then(|| h * 3600 + m * 60 + s)
    };
    let bounds = match *numbers {
        [hour] => return now.hour() == hour,
        [h1, h2] => seconds(h1, 0, 0).zip(seconds(h2, 0, 0)),
        [h1, m1, h2, m2] => seconds(h1, m1, 0).zip(seconds(h2, m2, 0)),
        [h1, m1, s1, h2, m2, s2] => seconds(h1, m1, s1).zip(seconds(h2, m2, s2)),
        _ => return false,
    };
    let Some((start, end)) = bounds else {
        return false;
    };
    let current = now.num_seconds_from_midnight();
    if start <= end {
        start <= current && current <= end
    } else {
        current >= start || current <= end
    }
}
