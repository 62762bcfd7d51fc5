use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use selectors::attr::CaseSensitivity;
use static_init::dynamic;

use crate::data_backend::opening_times::{from_day_ranges, DayRange};
use crate::data_backend::{
    fetch_page, parse_price, sanitize_title, zero_price, DietClassifier, RawRow,
};
use crate::data_types::stwhh_data_types::LocationOpenings;
use crate::data_types::{CanteenResult, OpeningTimes, ServingDraft};
use crate::errors::FetchError;

const CLASSIFIER: DietClassifier = DietClassifier::SymbolCodes {
    vegetarian: "31",
    vegan: "38",
};

#[dynamic]
static TILE_SEL: Selector = Selector::parse(".menue-tile").unwrap();
#[dynamic]
static HEADLINE_SEL: Selector = Selector::parse(".singlemeal__headline").unwrap();
#[dynamic]
static INFO_SEL: Selector = Selector::parse(".singlemeal__info").unwrap();
#[dynamic]
static TIMESTAMP_SEL: Selector = Selector::parse("[data-timestamp]").unwrap();

pub async fn get_canteen_data(
    client: &reqwest::Client,
    url: &str,
    location: u32,
) -> Result<CanteenResult, FetchError> {
    let today_plan = fetch_page(client, url).await?;
    let next_day_plan = fetch_page(client, &next_day_url(url)).await?;

    let mut servings = parse_day_plan(&today_plan, location);
    servings.extend(parse_day_plan(&next_day_plan, location));

    Ok(CanteenResult::new(
        parse_opening_times(&today_plan, location),
        servings,
    ))
}

fn next_day_url(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t=next_day", url, sep)
}

fn location_selector(attr: &str, location: u32) -> Option<Selector> {
    Selector::parse(&format!(r#"[{}="{}"]"#, attr, location)).ok()
}

/// Opening times live as JSON in the `data-openings` attribute of the location element.
/// The list mixes opening and serving hours without telling them apart; the last
/// entry for a weekday wins.
pub fn parse_opening_times(plan: &str, location: u32) -> OpeningTimes {
    let document = Html::parse_document(plan);
    let Some(sel) = location_selector("data-location", location) else {
        return OpeningTimes::new();
    };
    let Some(raw) = document
        .select(&sel)
        .next()
        .and_then(|e| e.value().attr("data-openings"))
    else {
        return OpeningTimes::new();
    };

    match serde_json::from_str::<LocationOpenings>(raw) {
        Ok(openings) => from_day_ranges(openings.openings.iter().map(|row| DayRange {
            day_from: &row.day_from,
            day_to: Some(&row.day_to),
            time_from: &row.time_from,
            time_to: &row.time_to,
        })),
        Err(e) => {
            log::warn!("location {}: unreadable opening times: {}", location, e);
            OpeningTimes::new()
        }
    }
}

pub fn parse_day_plan(plan: &str, location: u32) -> Vec<ServingDraft> {
    let document = Html::parse_document(plan);
    let Some(section_sel) = location_selector("data-location-id", location) else {
        return Vec::new();
    };
    let Some(section) = document.select(&section_sel).next() else {
        log::debug!("location {} not on plan", location);
        return Vec::new();
    };

    let tiles: Vec<ElementRef> = section.select(&TILE_SEL).collect();
    if tiles.is_empty() {
        return Vec::new();
    }

    // every day tab carries a timestamp, only the shown one is marked active
    let Some(day) = section
        .select(&TIMESTAMP_SEL)
        .find(|e| {
            e.value().has_class(
                "tx-epwerkmenu-menu-timestamp-active",
                CaseSensitivity::CaseSensitive,
            )
        })
        .and_then(|e| e.value().attr("data-timestamp"))
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
    else {
        log::warn!("location {}: plan has no readable date", location);
        return Vec::new();
    };

    tiles
        .into_iter()
        .filter_map(|tile| parse_tile(tile, day))
        .collect()
}

// category header tiles have no headline and are dropped here
fn parse_tile(tile: ElementRef, day: NaiveDate) -> Option<ServingDraft> {
    let headline = tile.select(&HEADLINE_SEL).next()?;
    let title = sanitize_title(&headline.text().collect::<String>());
    if title.is_empty() {
        return None;
    }

    let mut price = zero_price();
    let mut price_staff = zero_price();
    for info in tile.select(&INFO_SEL) {
        let text = info.text().collect::<String>();
        if text.contains("Studierende") {
            price = parse_price(&text);
        } else if text.contains("Bedienstete") {
            price_staff = parse_price(&text);
        }
    }

    let split_attr = |name: &str| -> Vec<String> {
        tile.value()
            .attr(name)
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    };
    let symbols = split_attr("data-symbols");
    let diet = CLASSIFIER.classify(&RawRow {
        title: &title,
        markers: &symbols,
    });

    Some(ServingDraft {
        day,
        title,
        price,
        price_staff,
        vegetarian: diet.vegetarian,
        vegan: diet.vegan,
        allergens: split_attr("data-allergens").into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    const PLAN: &str = r#"<!DOCTYPE html><html><body>
<div class="location" data-location="310" data-openings='{"openings":[{"dayFrom":"Montag","dayTo":"Freitag","timeFrom":"11:00 Uhr","timeTo":"14:30 Uhr"},{"dayFrom":"Samstag","dayTo":"","timeFrom":"11:30 Uhr","timeTo":"14:00 Uhr"}]}'></div>
<section data-location-id="310">
  <span class="tx-epwerkmenu-menu-timestamp" data-timestamp="2024-05-10">Fr, 10.05.</span>
  <span class="tx-epwerkmenu-menu-timestamp tx-epwerkmenu-menu-timestamp-active" data-timestamp="2024-05-13">Mo, 13.05.</span>
  <div class="menue-tile">Hauptgerichte</div>
  <div class="menue-tile" data-allergens="Gl Ei Gl" data-symbols="12 31">
    <h5 class="singlemeal__headline">Käsespätzle (Gl, Ei (a)) mit Röstzwiebeln , Salat</h5>
    <div class="singlemeal__info">Studierende 3,20 €</div>
    <div class="singlemeal__info">Bedienstete 4,80 €</div>
  </div>
  <div class="menue-tile" data-allergens="" data-symbols="38 31">
    <h5 class="singlemeal__headline">Linsendal</h5>
    <div class="singlemeal__info">Gäste 5,00 €</div>
  </div>
</section>
<section data-location-id="350">
  <span class="tx-epwerkmenu-menu-timestamp-active" data-timestamp="2024-05-13"></span>
  <div class="menue-tile"><h5 class="singlemeal__headline">Falsche Mensa</h5></div>
</section>
</body></html>"#;

    #[test]
    fn header_tiles_are_skipped_wherever_they_are() {
        let plan = r#"<html><body><section data-location-id="310">
  <span class="tx-epwerkmenu-menu-timestamp-active" data-timestamp="2024-05-13"></span>
  <div class="menue-tile"><h5 class="singlemeal__headline">Currywurst</h5></div>
  <div class="menue-tile">Beilagen</div>
  <div class="menue-tile"><h5 class="singlemeal__headline">Pommes frites</h5></div>
</section></body></html>"#;

        let titles: Vec<String> = parse_day_plan(plan, 310)
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Currywurst", "Pommes frites"]);
    }

    #[test]
    fn tiles_of_the_location_are_parsed() {
        let servings = parse_day_plan(PLAN, 310);
        assert_eq!(servings.len(), 2);

        let spaetzle = &servings[0];
        assert_eq!(spaetzle.day, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!(spaetzle.title, "Käsespätzle mit Röstzwiebeln, Salat");
        assert_eq!(spaetzle.price, Decimal::new(320, 2));
        assert_eq!(spaetzle.price_staff, Decimal::new(480, 2));
        assert!(spaetzle.vegetarian && !spaetzle.vegan);
        assert_eq!(
            spaetzle.allergens.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["Ei", "Gl"]
        );

        let dal = &servings[1];
        assert!(dal.vegetarian && dal.vegan);
        assert_eq!(dal.price.to_string(), "0.00");
        assert!(dal.allergens.is_empty());
    }

    #[test]
    fn unknown_location_is_empty() {
        assert!(parse_day_plan(PLAN, 999).is_empty());
    }

    #[test]
    fn missing_date_skips_the_day() {
        let undated = PLAN.replace(r#"data-timestamp="2024-05-13">Mo"#, r#"data-timestamp="kaputt">Mo"#);
        assert!(parse_day_plan(&undated, 310).is_empty());
    }

    #[test]
    fn opening_times_come_from_json_attribute() {
        let times = parse_opening_times(PLAN, 310);
        let lunch = (
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
        );
        assert_eq!(times.len(), 6);
        assert_eq!(times[&1], lunch);
        assert_eq!(times[&5], lunch);
        assert_eq!(times[&6].0, NaiveTime::from_hms_opt(11, 30, 0).unwrap());
        assert!(parse_opening_times(PLAN, 350).is_empty());
    }

    #[test]
    fn next_day_url_keeps_existing_query() {
        assert_eq!(
            next_day_url("https://example.org/speiseplan/"),
            "https://example.org/speiseplan/?t=next_day"
        );
        assert_eq!(
            next_day_url("https://example.org/plan?l=310"),
            "https://example.org/plan?l=310&t=next_day"
        );
    }
}
