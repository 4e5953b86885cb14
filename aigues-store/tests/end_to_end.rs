//! Login, contract discovery and one coordinator cycle against a mock API.

use aigues_core::Credentials;
use aigues_fetch::AiguesClient;
use aigues_store::{
    ContractCoordinator, ContractRegistry, CoordinatorError, MemoryStatistics, StatisticsSink,
    UpdateOutcome,
};
use base64::prelude::*;
use chrono::{Duration, Local, NaiveDateTime, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;

fn make_token(exp: i64) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = BASE64_URL_SAFE_NO_PAD.encode(format!(r#"{{"name":"12345678Z","exp":{exp}}}"#));
    format!("{header}.{body}.signature")
}

fn daily_records() -> Vec<(NaiveDateTime, f64)> {
    let today = Local::now().date_naive();
    (1..=7)
        .rev()
        .enumerate()
        .map(|(i, days_ago)| {
            let at = (today - Duration::days(days_ago))
                .and_hms_opt(0, 0, 0)
                .unwrap();
            (at, 100.0 + i as f64 * 0.35)
        })
        .collect()
}

#[tokio::test]
async fn test_login_contracts_and_first_cycle() {
    let mut server = Server::new_async().await;
    let token = make_token(Utc::now().timestamp() + 3600);

    let login = server
        .mock("POST", "/ofex-login-api/auth/getToken")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "access_token": token }).to_string())
        .create_async()
        .await;

    let contracts = server
        .mock("GET", "/ofex-contracts-api/contracts")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({ "data": [ { "contractDetail": { "contractNumber": "W1234567" } } ] })
                .to_string(),
        )
        .create_async()
        .await;

    let records = daily_records();
    let data: Vec<_> = records
        .iter()
        .map(|(at, value)| {
            json!({
                "datetime": at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "accumulatedConsumption": value,
            })
        })
        .collect();
    let consumptions = server
        .mock("GET", "/ofex-water-consumptions-api/meter/consumptions")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("contractNumber".into(), "W1234567".into()),
            Matcher::UrlEncoded("consumptionFrequency".into(), "HOURLY".into()),
        ]))
        .with_status(200)
        .with_body(json!({ "data": data }).to_string())
        .create_async()
        .await;

    let mut client =
        AiguesClient::with_base_url(Credentials::new("12345678Z", "secret"), &server.url())
            .unwrap();
    client.login(None, None, None).await.unwrap();
    assert!(!client.is_token_expired());

    let ids = client.contract_ids().await.unwrap();
    assert_eq!(ids, vec!["W1234567"]);

    let registry = ContractRegistry::new();
    let sink = Arc::new(MemoryStatistics::new());
    let mut coordinator = ContractCoordinator::new(client, &ids[0], registry.clone(), sink.clone());

    let outcome = coordinator.update().await.unwrap();
    let (last_at, last_value) = records[6];
    assert!(matches!(
        outcome,
        UpdateOutcome::Updated { at, value, .. } if at == last_at && value == last_value
    ));

    let reading = registry.reading("W1234567").await.unwrap();
    assert_eq!(reading.value, Some(last_value));
    assert_eq!(reading.last_measure, Some(last_at));

    let points = sink.statistics("sensor.contador_w1234567").await.unwrap();
    assert_eq!(points.len(), 7);
    assert!(points.windows(2).all(|w| w[0].start < w[1].start && w[0].sum <= w[1].sum));

    login.assert_async().await;
    contracts.assert_async().await;
    consumptions.assert_async().await;
}

#[tokio::test]
async fn test_revoked_token_signals_reauthentication() {
    let mut server = Server::new_async().await;
    let _consumptions = server
        .mock("GET", "/ofex-water-consumptions-api/meter/consumptions")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"statusCode":401,"message":"JWT Token Revoked"}"#)
        .create_async()
        .await;

    let mut client =
        AiguesClient::with_base_url(Credentials::new("12345678Z", "secret"), &server.url())
            .unwrap();
    client.set_token(make_token(Utc::now().timestamp() + 3600));

    let registry = ContractRegistry::new();
    let mut coordinator = ContractCoordinator::new(
        client,
        "W1234567",
        registry.clone(),
        Arc::new(MemoryStatistics::new()),
    );

    let result = coordinator.update().await;
    assert!(matches!(result, Err(CoordinatorError::AuthFailed { .. })));
    assert!(
        registry
            .get_error("W1234567")
            .await
            .is_some_and(|e| e.contains("JWT Token Revoked"))
    );
}
