//! Fetch paths of the source adapters against a local mock server.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mensa_archive_rs::archive::Archive;
use mensa_archive_rs::config::{CanteenConfig, Config, SourceConfig, Thresholds};
use mensa_archive_rs::data_backend::{fetch_page, legacy_parser, stwhh_parser};
use mensa_archive_rs::errors::FetchError;
use mensa_archive_rs::task_scheduler_funcs::{build_client, run_cycle};

fn client() -> reqwest::Client {
    build_client(&Config::default()).unwrap()
}

fn legacy_plan(date: &str, dish: &str) -> String {
    format!(
        r#"<html><body><h1>Speiseplan für {}</h1><table><tr>
<td class="dish-description">{}</td><td>2,45 €</td><td>3,85 €</td>
</tr></table></body></html>"#,
        date, dish
    )
}

fn stwhh_plan(day: &str, dish: &str) -> String {
    format!(
        r#"<html><body>
<div data-location="310" data-openings='{{"openings":[{{"dayFrom":"Montag","dayTo":"Freitag","timeFrom":"11:00","timeTo":"14:30"}}]}}'></div>
<section data-location-id="310">
  <span class="tx-epwerkmenu-menu-timestamp-active" data-timestamp="{}"></span>
  <div class="menue-tile" data-allergens="" data-symbols="">
    <h5 class="singlemeal__headline">{}</h5>
    <div class="singlemeal__info">Studierende 3,50 €</div>
  </div>
</section>
</body></html>"#,
        day, dish
    )
}

const DESY_PLAN: &str = r#"<html><body>
<div class="entry" id="entry-2024-05-13">
  <table class="entry"><tr><td>Linsencurry</td><td>€ 4,80</td></tr></table>
</div>
</body></html>"#;

#[tokio::test]
async fn error_status_is_reported_with_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/speiseplan/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/speiseplan/", server.uri());
    match fetch_page(&client(), &url).await {
        Err(FetchError::Status { url: failed, status }) => {
            assert_eq!(status, 503);
            assert_eq!(failed, url);
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn legacy_source_requests_today_and_next_day() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/de/350/2016/0/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(legacy_plan("14.11.2016", "Gemüsecurry")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/de/350/2016/99/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(legacy_plan("15.11.2016", "Linseneintopf")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let template = format!("{}/de/350/{{year}}/{{day}}/", server.uri());
    let today = NaiveDate::from_ymd_opt(2016, 11, 14).unwrap();
    let result = legacy_parser::get_canteen_data(&client(), &template, today)
        .await
        .unwrap();

    assert!(result.opening_times.is_empty());
    let days: Vec<(NaiveDate, &str)> = result
        .servings
        .iter()
        .map(|s| (s.day, s.title.as_str()))
        .collect();
    assert_eq!(
        days,
        vec![
            (today, "Gemüsecurry"),
            (NaiveDate::from_ymd_opt(2016, 11, 15).unwrap(), "Linseneintopf"),
        ]
    );
    assert_eq!(result.servings[0].price_staff, Decimal::new(385, 2));
}

#[tokio::test]
async fn studierendenwerk_source_also_fetches_next_day() {
    let server = MockServer::start().await;
    // mounted first, so it wins over the plain path for the second request
    Mock::given(method("GET"))
        .and(path("/speiseplan/"))
        .and(query_param("t", "next_day"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(stwhh_plan("2024-05-14", "Linsendal")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/speiseplan/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(stwhh_plan("2024-05-13", "Currywurst")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/speiseplan/", server.uri());
    let result = stwhh_parser::get_canteen_data(&client(), &url, 310)
        .await
        .unwrap();

    let titles: Vec<&str> = result.servings.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Currywurst", "Linsendal"]);
    assert_eq!(
        result.servings[1].day,
        NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
    );
    assert_eq!(result.opening_times.len(), 5);
}

#[tokio::test]
async fn failing_canteen_leaves_the_others_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/kaputt/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/desy/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DESY_PLAN))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        canteens: vec![
            CanteenConfig {
                name: "Philturm".to_string(),
                source: SourceConfig::Desy {
                    url: format!("{}/kaputt/", server.uri()),
                    english: false,
                },
            },
            CanteenConfig {
                name: "DESY".to_string(),
                source: SourceConfig::Desy {
                    url: format!("{}/desy/", server.uri()),
                    english: false,
                },
            },
        ],
        ..Config::default()
    };
    let mut archive = Archive::open_in_memory(Thresholds::default()).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();

    let report = run_cycle(&config, &client(), &mut archive, None, today)
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].canteen, "Philturm");
    assert!(report.failed[0].reason.contains("500"));
    assert_eq!(report.reconciled.len(), 1);
    assert_eq!(report.reconciled[0].canteen, "DESY");
    assert_eq!(report.reconciled[0].created, 1);

    let listing = archive.servings_for_day(today).unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].dish_name, "Linsencurry");
    assert!(archive.canteen_id("Philturm").unwrap().is_none());
}
