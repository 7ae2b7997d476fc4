use dam_core::models::{
    Area, AreaClearingResult, AreaId, CapacityMatrix, ClearingStatus, Day, Direction, FlowMatrix,
    Map,
};
use serde_json::json;

#[test]
fn flow_matrix_survives_json() {
    let areas: Vec<AreaId> = vec!["north".into(), "south".into()];
    let capacities: CapacityMatrix = [(("north".into(), "south".into()), 40.0)]
        .into_iter()
        .collect();
    let raw: Map<(AreaId, AreaId), f64> = [
        (("north".into(), "south".into()), 30.0),
        (("south".into(), "north".into()), 17.5),
    ]
    .into_iter()
    .collect();

    let mut flows = FlowMatrix::new(areas);
    flows.set_hour(7, &raw, &capacities).unwrap();

    let text = serde_json::to_string(&flows).unwrap();
    let back: FlowMatrix = serde_json::from_str(&text).unwrap();
    assert_eq!(back, flows);
    assert_eq!(back.flow(&"north".into(), &"south".into(), 7), 12.5);
}

#[test]
fn clearing_result_survives_json() {
    let day = Day::new(2031, 364);
    let mut result = AreaClearingResult::new("south".into(), day);
    result.coupled = true;
    for (h, hour) in result.hours.iter_mut().enumerate() {
        hour.price = 40.0 + h as f64;
        hour.volume = 1000.0;
        hour.status = ClearingStatus::Cleared;
    }

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["area"], json!("south"));
    assert_eq!(value["day"], json!({ "year": 2031, "day": 364 }));
    assert_eq!(value["hours"][0]["status"], json!("cleared"));

    let back: AreaClearingResult = serde_json::from_value(value).unwrap();
    assert_eq!(back, result);
    assert!(back.is_cleared());
}

#[test]
fn enums_use_snake_case() {
    assert_eq!(
        serde_json::to_value(ClearingStatus::Invalid).unwrap(),
        json!("invalid")
    );
    assert_eq!(
        serde_json::from_value::<ClearingStatus>(json!("initial")).unwrap(),
        ClearingStatus::Initial
    );
    assert!(serde_json::from_value::<ClearingStatus>(json!("Cleared")).is_err());
    assert_eq!(serde_json::to_value(Direction::Ask).unwrap(), json!("ask"));
    assert!(serde_json::from_value::<Direction>(json!("Sell")).is_err());
}

#[test]
fn areas_are_coupled_unless_stated() {
    let area: Area = serde_json::from_value(json!({ "id": "north", "market_type": "power" }))
        .unwrap();
    assert_eq!(area, Area::new("north", "power"));

    let island: Area = serde_json::from_value(
        json!({ "id": "island", "market_type": "power", "coupled": false }),
    )
    .unwrap();
    assert!(!island.coupled);
}
