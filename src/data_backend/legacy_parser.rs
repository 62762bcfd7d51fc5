use chrono::{Datelike, NaiveDate};
use regex_lite::Regex;
use static_init::dynamic;

use crate::constants::{LEGACY_DAY_NEXT, LEGACY_DAY_TODAY};
use crate::data_backend::{fetch_page, parse_price, sanitize_title, DietClassifier, RawRow};
use crate::data_types::{CanteenResult, OpeningTimes, ServingDraft};
use crate::errors::FetchError;

// the old pages carry no dietary markers, only hints inside the dish text
const CLASSIFIER: DietClassifier = DietClassifier::TitleText;

pub async fn get_canteen_data(
    client: &reqwest::Client,
    url_template: &str,
    today: NaiveDate,
) -> Result<CanteenResult, FetchError> {
    let mut servings = Vec::new();

    for day_code in [LEGACY_DAY_TODAY, LEGACY_DAY_NEXT] {
        let url = build_url(url_template, today.year(), day_code);
        let plan = fetch_page(client, &url).await?;
        servings.extend(parse_plan(&plan));
    }

    // no opening hours on these pages
    Ok(CanteenResult::new(OpeningTimes::new(), servings))
}

/// Fills `{year}` and `{day}` of a legacy plan url.
pub fn build_url(template: &str, year: i32, day_code: u32) -> String {
    template
        .replace("{year}", &year.to_string())
        .replace("{day}", &day_code.to_string())
}

/// The first `d.m.yyyy` on the page is the date the plan is for.
pub fn parse_plan_date(plan: &str) -> Option<NaiveDate> {
    #[dynamic]
    static DATE_RE: Regex = Regex::new(r"\d{1,2}\.\d{1,2}\.\d{4}").unwrap();

    let found = DATE_RE.find(plan)?;
    NaiveDate::parse_from_str(found.as_str(), "%d.%m.%Y").ok()
}

pub fn parse_plan(plan: &str) -> Vec<ServingDraft> {
    #[dynamic]
    static DISH_RE: Regex = Regex::new(
        r#"(?s)class="dish-description">(.*?)</td>.*?(\d+,\d+).*?(\d+,\d+)"#,
    )
    .unwrap();

    let Some(day) = parse_plan_date(plan) else {
        log::warn!("legacy plan without date, skipping page");
        return Vec::new();
    };

    let mut servings = Vec::new();
    for caps in DISH_RE.captures_iter(plan) {
        let raw_title = &caps[1];
        let title = sanitize_title(raw_title);
        if title.is_empty() {
            log::debug!("skipping legacy row without title");
            continue;
        }

        let diet = CLASSIFIER.classify(&RawRow {
            title: raw_title,
            markers: &[],
        });

        servings.push(ServingDraft {
            day,
            title,
            price: parse_price(&caps[2]),
            price_staff: parse_price(&caps[3]),
            vegetarian: diet.vegetarian,
            vegan: diet.vegan,
            allergens: Default::default(),
        });
    }

    servings
}
