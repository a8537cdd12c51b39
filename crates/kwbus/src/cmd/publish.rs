use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kwbus_hub::{HubConfig, PublisherHub};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, sleep_while_running, EndpointArgs, PublishArgs};
use crate::exit::{hub_error, io_error, transport_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};

pub fn run(args: PublishArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let payload = resolve_payload(&args)?;
    let keyword = args.endpoint.keyword.as_str();
    let hub = build_hub(&args.endpoint)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut sent = 0usize;
    while running.load(Ordering::SeqCst) {
        let reports = hub.update(keyword, &payload);
        let delivered: usize = reports.iter().map(|(_, report)| report.delivered()).sum();
        sent = sent.saturating_add(1);
        info!(keyword, sent, delivered, "update published");

        if args.count.is_some_and(|count| sent >= count) {
            break;
        }
        sleep_while_running(&running, interval);
    }

    hub.shutdown();
    Ok(SUCCESS)
}

fn build_hub(endpoint: &EndpointArgs) -> CliResult<PublisherHub> {
    let keyword = endpoint.keyword.as_str();

    if let Some(path) = &endpoint.config {
        let config = HubConfig::from_file(path).map_err(|err| hub_error("config", err))?;
        let hub = PublisherHub::from_config(&config).map_err(|err| hub_error("config", err))?;
        if hub.advertise_all(keyword) == 0 {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("publish failed: no endpoint could publish {keyword:?}"),
            ));
        }
        return Ok(hub);
    }

    let (Some(kind), Some(address)) = (endpoint.kind, endpoint.address.as_deref()) else {
        return Err(CliError::new(
            crate::exit::USAGE,
            "either KIND and ADDRESS or --config is required",
        ));
    };
    let mut transport = kind
        .publisher()
        .map_err(|err| transport_error("publish failed", err))?;
    transport
        .publish(address, keyword)
        .map_err(|err| transport_error("publish failed", err))?;

    let hub = PublisherHub::new();
    hub.add_transmitter(address, transport);
    Ok(hub)
}

fn resolve_payload(args: &PublishArgs) -> CliResult<String> {
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(String::new())
}
