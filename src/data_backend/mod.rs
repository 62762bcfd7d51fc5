use std::time::Instant;

use chrono::NaiveDate;
use regex_lite::Regex;
use rust_decimal::Decimal;
use static_init::dynamic;

use crate::config::{CanteenConfig, SourceConfig};
use crate::data_types::{CanteenResult, Diet};
use crate::errors::FetchError;

pub mod desy_parser;
pub mod legacy_parser;
pub mod opening_times;
pub mod stwhh_parser;

/// Removes parenthesized groups, nested ones included, in a single pass.
/// Unbalanced closing parens are ignored; an unclosed `(` swallows the rest.
pub fn remove_nested_brackets(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut depth: usize = 0;

    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => output.push(c),
            _ => {}
        }
    }

    output
}

/// Cleans a raw dish title taken from upstream markup.
pub fn sanitize_title(raw: &str) -> String {
    #[dynamic]
    static MARKUP_RE: Regex = Regex::new(r"(?i)<br\s*/?>|<img [^>]*>|\r|\n").unwrap();
    #[dynamic]
    static SPACE_COMMA_RE: Regex = Regex::new(r"\s+,").unwrap();

    let decoded = raw.replace("&nbsp;", " ").replace("&amp;", "&");
    let no_markup = MARKUP_RE.replace_all(&decoded, " ");
    let no_brackets = remove_nested_brackets(&no_markup);
    let collapsed = no_brackets.split_whitespace().collect::<Vec<_>>().join(" ");

    SPACE_COMMA_RE.replace_all(&collapsed, ",").to_string()
}

/// Reads the first `<int>,<int>` in the text as an exact decimal. No match yields 0.00.
pub fn parse_price(text: &str) -> Decimal {
    #[dynamic]
    static PRICE_RE: Regex = Regex::new(r"(\d+),(\d+)").unwrap();

    PRICE_RE
        .captures(text)
        .and_then(|caps| decimal_from_parts(&caps[1], &caps[2]))
        .unwrap_or_else(zero_price)
}

pub(crate) fn decimal_from_parts(int_part: &str, frac_part: &str) -> Option<Decimal> {
    format!("{}.{}", int_part, frac_part).parse().ok()
}

pub(crate) fn zero_price() -> Decimal {
    Decimal::new(0, 2)
}

/// How a source decides whether a row is vegetarian/vegan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DietClassifier {
    /// Exact symbol codes attached to the row.
    SymbolCodes {
        vegetarian: &'static str,
        vegan: &'static str,
    },
    /// Icon file names; a marker matches when it contains the given fragment.
    IconNames {
        vegetarian: &'static str,
        vegan: &'static str,
    },
    /// Legacy pages carry no markers, the dish text itself has to be searched.
    TitleText,
}

/// The raw row data a classifier may look at.
pub struct RawRow<'a> {
    pub title: &'a str,
    pub markers: &'a [String],
}

impl DietClassifier {
    pub fn classify(&self, row: &RawRow) -> Diet {
        match *self {
            DietClassifier::SymbolCodes { vegetarian, vegan } => {
                let has = |code: &str| row.markers.iter().any(|m| m == code);
                Diet {
                    vegetarian: has(vegetarian),
                    vegan: has(vegan),
                }
            }
            DietClassifier::IconNames { vegetarian, vegan } => {
                let has = |frag: &str| row.markers.iter().any(|m| m.contains(frag));
                Diet {
                    vegetarian: has(vegetarian),
                    vegan: has(vegan),
                }
            }
            DietClassifier::TitleText => {
                #[dynamic]
                static VEGGIE_RE: Regex = Regex::new(r"(?i)vegetarisch|vegan").unwrap();
                #[dynamic]
                static VEGAN_RE: Regex = Regex::new(r"(?i)vegan").unwrap();

                Diet {
                    vegetarian: VEGGIE_RE.is_match(row.title),
                    vegan: VEGAN_RE.is_match(row.title),
                }
            }
        }
    }
}

pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let now = Instant::now();
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let text = resp.text().await?;
    log::debug!("GET {}: {:.2?}", url, now.elapsed());
    Ok(text)
}

/// Fetches and parses one canteen with the adapter its config selects.
pub async fn fetch_canteen(
    client: &reqwest::Client,
    canteen: &CanteenConfig,
    today: NaiveDate,
) -> Result<CanteenResult, FetchError> {
    let now = Instant::now();
    let result = match &canteen.source {
        SourceConfig::Legacy { url } => legacy_parser::get_canteen_data(client, url, today).await,
        SourceConfig::Studierendenwerk { url, location } => {
            stwhh_parser::get_canteen_data(client, url, *location).await
        }
        SourceConfig::Desy { url, english } => {
            desy_parser::get_canteen_data(client, url, *english).await
        }
    }?;

    log::info!(
        "{}: {} servings, {} opening days ({:.2?})",
        canteen.name,
        result.servings.len(),
        result.opening_times.len(),
        now.elapsed()
    );
    Ok(result)
}
