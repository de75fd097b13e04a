use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    hostex_config::BridgeConfig,
    hostex_connector::{HostexClient, HostexConnector, connector::derive_login_id},
    hostex_portal::{MemorySink, PortalSink, RemoteEvent},
    secrecy::Secret,
    serde_json::Value,
    tokio::sync::broadcast::error::RecvError,
    tracing::{error, info, warn},
};

fn print_event(event: &RemoteEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

fn grace(config: &BridgeConfig) -> Duration {
    Duration::from_secs(config.bridge.shutdown_grace_secs)
}

/// Configured logins, optionally narrowed to one, sorted by id.
fn select_logins<'a>(
    config: &'a BridgeConfig,
    only: Option<&str>,
) -> Result<Vec<(&'a String, &'a Value)>> {
    if config.logins.is_empty() {
        bail!("no logins configured; add a `logins.<id>` section with an access_token");
    }
    let mut logins: Vec<(&String, &Value)> = config
        .logins
        .iter()
        .filter(|(id, _)| only.is_none_or(|only| only == id.as_str()))
        .collect();
    if logins.is_empty() {
        bail!("login not configured: {}", only.unwrap_or_default());
    }
    logins.sort_by(|a, b| a.0.cmp(b.0));
    Ok(logins)
}

/// Connector whose events land in `sink` for printing after the fact.
fn recording_connector(sink: &Arc<MemorySink>) -> HostexConnector {
    HostexConnector::new(Arc::clone(sink) as Arc<dyn PortalSink>)
}

fn report_failures(connector: &HostexConnector) {
    for failure in connector.supervisor().failures() {
        warn!(
            login_id = %failure.login_id,
            task = %failure.task,
            at = %failure.at,
            error = %failure.error,
            "background task failed"
        );
    }
}

pub async fn run(config: &BridgeConfig) -> Result<()> {
    let logins = select_logins(config, None)?;
    let sink = Arc::new(MemorySink::streaming());
    let mut events = sink.subscribe();
    let connector = HostexConnector::new(sink);

    for (login_id, value) in logins {
        if let Err(e) = connector.start_login(login_id, value.clone()).await {
            error!(login_id = %login_id, error = %e, "failed to start hostex login");
        }
    }
    if connector.login_ids().is_empty() {
        bail!("no hostex login could be started");
    }
    info!(logins = connector.login_ids().len(), "bridge running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if !connector.shutdown(grace(config)).await {
        warn!("some tasks did not finish before the shutdown grace period");
    }
    report_failures(&connector);
    Ok(())
}

pub async fn sync(config: &BridgeConfig, only: Option<&str>) -> Result<()> {
    let logins = select_logins(config, only)?;
    let sink = Arc::new(MemorySink::new());
    let connector = recording_connector(&sink);

    for (login_id, value) in logins {
        connector
            .login(login_id, value.clone())
            .await
            .with_context(|| format!("login {login_id}"))?;
        let report = connector.poll_now(login_id).await?;
        for event in sink.take_events() {
            print_event(&event)?;
        }
        eprintln!("{login_id}: {}", serde_json::to_string(&report)?);
    }
    Ok(())
}

pub async fn trigger(config: &BridgeConfig, command: &str) -> Result<()> {
    let logins = select_logins(config, None)?;
    let sink = Arc::new(MemorySink::new());
    let connector = recording_connector(&sink);

    for (login_id, value) in logins {
        if let Err(e) = connector.login(login_id, value.clone()).await {
            error!(login_id = %login_id, error = %e, "failed to log in");
        }
    }

    eprintln!("{}", connector.handle_command(command));
    connector.supervisor().shutdown(grace(config)).await;
    for event in sink.take_events() {
        print_event(&event)?;
    }
    report_failures(&connector);
    if !connector.supervisor().failures().is_empty() {
        bail!("trigger finished with failures");
    }
    Ok(())
}

/// Reservations listed by `check-token`.
const RESERVATION_PREVIEW: usize = 5;

pub async fn check_token(token: String, api_url: &str) -> Result<()> {
    let login_id = derive_login_id(&token);
    let client = HostexClient::new(Secret::new(token), api_url, Duration::from_secs(10))?;
    println!("login id: {login_id}");
    print!("{}", describe_account(&client).await?);
    Ok(())
}

/// Properties plus the most recent reservations visible to the token.
async fn describe_account(client: &HostexClient) -> Result<String> {
    let properties = client
        .list_properties()
        .await
        .context("hostex rejected the access token")?;

    let mut out = format!("properties: {}\n", properties.len());
    for property in &properties {
        out.push_str(&format!("  {} {}\n", property.id, property.title));
    }

    match client.list_reservations(None, 0, RESERVATION_PREVIEW).await {
        Ok(reservations) => {
            out.push_str(&format!("recent reservations: {}\n", reservations.len()));
            for r in reservations {
                out.push_str(&format!(
                    "  {} {} {}..{} {}\n",
                    r.reservation_code, r.guest_name, r.check_in_date, r.check_out_date, r.status
                ));
            }
        },
        Err(e) => warn!(error = %e, "could not list reservations"),
    }
    Ok(out)
}

pub async fn send(
    config: &BridgeConfig,
    login_id: &str,
    conversation_id: &str,
    message: &str,
    jpeg: Option<&Path>,
) -> Result<()> {
    let (login_id, value) = select_logins(config, Some(login_id))?
        .into_iter()
        .next()
        .context("login not configured")?;

    let image = match jpeg {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let connector = HostexConnector::new(Arc::new(MemorySink::new()));
    connector.login(login_id, value.clone()).await?;
    let sent = connector
        .send_message(login_id, conversation_id, message, image.as_deref())
        .await?;
    println!("{}", serde_json::to_string(&sent)?);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        mockito::{Matcher, Server},
        serde_json::json,
    };

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config
            .logins
            .insert("b".into(), json!({"access_token": "tok-b"}));
        config
            .logins
            .insert("a".into(), json!({"access_token": "tok-a"}));
        config
    }

    #[test]
    fn selects_all_logins_sorted() {
        let config = config();
        let ids: Vec<&str> = select_logins(&config, None)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn selects_single_login() {
        let config = config();
        let selected = select_logins(&config, Some("b")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].1["access_token"], "tok-b");
        assert!(select_logins(&config, Some("zzz")).is_err());
    }

    #[tokio::test]
    async fn recording_connector_shares_the_sink() {
        let sink = Arc::new(MemorySink::new());
        let connector = recording_connector(&sink);
        assert!(connector.login_ids().is_empty());
        assert_eq!(Arc::strong_count(&sink), 2);
        assert!(sink.take_events().is_empty());
    }

    #[test]
    fn empty_config_is_an_error() {
        assert!(select_logins(&BridgeConfig::default(), None).is_err());
    }

    fn ok(data: Value) -> String {
        json!({"request_id": "r", "error_code": 200, "error_msg": "", "data": data}).to_string()
    }

    #[tokio::test]
    async fn account_description_lists_properties_and_reservations() {
        let mut server = Server::new_async().await;
        let _properties = server
            .mock("GET", "/properties")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ok(json!({"properties": [{"id": 7, "title": "Sea View Loft"}]})))
            .create_async()
            .await;
        let reservations = server
            .mock("GET", "/reservations")
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_body(ok(json!({"reservations": [{
                "reservation_code": "R-1",
                "property_id": 7,
                "guest_name": "Ada",
                "check_in_date": "2025-03-01",
                "check_out_date": "2025-03-04",
                "status": "accepted",
            }]})))
            .create_async()
            .await;

        let client =
            HostexClient::new(Secret::new("tok".into()), &server.url(), Duration::from_secs(5))
                .unwrap();
        let out = describe_account(&client).await.unwrap();

        assert!(out.contains("properties: 1"));
        assert!(out.contains("7 Sea View Loft"));
        assert!(out.contains("recent reservations: 1"));
        assert!(out.contains("R-1 Ada 2025-03-01..2025-03-04 accepted"));
        reservations.assert_async().await;
    }

    #[tokio::test]
    async fn reservation_failure_does_not_fail_the_check() {
        let mut server = Server::new_async().await;
        let _properties = server
            .mock("GET", "/properties")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ok(json!({"properties": []})))
            .create_async()
            .await;
        let _reservations = server
            .mock("GET", "/reservations")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client =
            HostexClient::new(Secret::new("tok".into()), &server.url(), Duration::from_secs(5))
                .unwrap();
        let out = describe_account(&client).await.unwrap();
        assert_eq!(out, "properties: 0\n");
    }
}
