use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use static_init::dynamic;

use crate::data_backend::opening_times::extract_opening_times;
use crate::data_backend::{
    decimal_from_parts, fetch_page, sanitize_title, zero_price, DietClassifier, RawRow,
};
use crate::data_types::{CanteenResult, OpeningTimes, ServingDraft};
use crate::errors::FetchError;

const CLASSIFIER: DietClassifier = DietClassifier::IconNames {
    vegetarian: "icon-vegetarian",
    vegan: "icon-vegan",
};

// rows that are on every day's plan and are not dishes
const FILTER_ITEMS: [&str; 3] = [
    "Tagessuppe mit Einlage",
    "Preis per 100g",
    "Soup of the day with extras",
];

#[dynamic]
static DAY_SEL: Selector = Selector::parse("div.entry[id]").unwrap();
#[dynamic]
static ITEM_SEL: Selector = Selector::parse("table.entry").unwrap();
#[dynamic]
static CELL_SEL: Selector = Selector::parse("td").unwrap();
#[dynamic]
static ICON_SEL: Selector = Selector::parse("img.category-icons[src]").unwrap();
#[dynamic]
static PARAGRAPH_SEL: Selector = Selector::parse("p").unwrap();
#[dynamic]
static OPENINGS_SEL: Selector = Selector::parse("div#openings p").unwrap();

pub async fn get_canteen_data(
    client: &reqwest::Client,
    url: &str,
    english: bool,
) -> Result<CanteenResult, FetchError> {
    // one page holds the whole week
    let plan = fetch_page(client, url).await?;

    Ok(CanteenResult::new(
        parse_opening_times(&plan, english),
        parse_full_plan(&plan),
    ))
}

pub fn parse_opening_times(plan: &str, english: bool) -> OpeningTimes {
    let label = if english { "Canteen" } else { "Kantine" };
    let document = Html::parse_document(plan);

    let Some(paragraph) = document.select(&OPENINGS_SEL).next() else {
        return OpeningTimes::new();
    };

    let mut strings = paragraph
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    while let Some(s) = strings.next() {
        if s.trim_end_matches(':') == label {
            return extract_opening_times(strings.next());
        }
    }

    log::debug!("no opening times for '{}' on plan", label);
    OpeningTimes::new()
}

pub fn parse_full_plan(plan: &str) -> Vec<ServingDraft> {
    let document = Html::parse_document(plan);
    let mut servings = Vec::new();

    for day in document.select(&DAY_SEL) {
        let id = day.value().id().unwrap_or_default();
        let Ok(date) = NaiveDate::parse_from_str(id, "entry-%Y-%m-%d") else {
            log::debug!("skipping day block '{}'", id);
            continue;
        };

        servings.extend(day.select(&ITEM_SEL).filter_map(|item| parse_item(item, date)));
    }

    servings
}

fn parse_item(item: ElementRef, day: NaiveDate) -> Option<ServingDraft> {
    #[dynamic]
    static ALLERGEN_RE: Regex = Regex::new(r"(\d+\.?\d?)\)").unwrap();

    // first text is German, second English
    let titles: Vec<String> = item
        .select(&CELL_SEL)
        .next()?
        .text()
        .map(sanitize_title)
        .filter(|s| !s.is_empty())
        .collect();
    if FILTER_ITEMS.contains(&titles.first()?.as_str()) {
        return None;
    }

    let icons: Vec<String> = item
        .select(&ICON_SEL)
        .filter_map(|img| img.value().attr("src"))
        .map(str::to_string)
        .collect();
    let title = titles.join(" / ");
    let diet = CLASSIFIER.classify(&RawRow {
        title: &title,
        markers: &icons,
    });

    let allergens: BTreeSet<String> = item
        .select(&PARAGRAPH_SEL)
        .map(|p| p.text().collect::<String>())
        .find(|text| text.contains("Allergene") || text.contains("allergens"))
        .map(|text| {
            ALLERGEN_RE
                .captures_iter(&text)
                .map(|caps| caps[1].to_string())
                .collect()
        })
        .unwrap_or_default();

    // the one price shown applies to staff as well
    let price = parse_price(&item.text().collect::<String>());

    Some(ServingDraft {
        day,
        title,
        price,
        price_staff: price,
        vegetarian: diet.vegetarian,
        vegan: diet.vegan,
        allergens,
    })
}

/// DESY prices are written `€ 5,40` or `€ 5.40`.
pub fn parse_price(text: &str) -> rust_decimal::Decimal {
    #[dynamic]
    static PRICE_RE: Regex = Regex::new(r"€\s*(\d+)[,.](\d+)").unwrap();

    // `\s` only covers ASCII whitespace
    let text = text.replace('\u{a0}', " ");
    PRICE_RE
        .captures(&text)
        .and_then(|caps| decimal_from_parts(&caps[1], &caps[2]))
        .unwrap_or_else(zero_price)
}
