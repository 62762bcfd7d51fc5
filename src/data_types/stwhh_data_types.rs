use serde::{Deserialize, Serialize};

// contents of the `data-openings` attribute on Studierendenwerk location elements
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocationOpenings {
    pub openings: Vec<OpeningRow>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OpeningRow {
    #[serde(rename = "dayFrom", default)]
    pub day_from: String,
    #[serde(rename = "dayTo", default)]
    pub day_to: String,
    #[serde(rename = "timeFrom", default)]
    pub time_from: String,
    #[serde(rename = "timeTo", default)]
    pub time_to: String,
}
