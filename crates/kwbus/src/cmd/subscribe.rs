use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use kwbus_hub::{HubConfig, SubscriberHub};
use tracing::debug;

use crate::cmd::{install_ctrlc_handler, parse_duration, sleep_while_running, EndpointArgs, SubscribeArgs};
use crate::exit::{hub_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR, USAGE};
use crate::output::{print_update, OutputFormat};

pub fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let poll = parse_duration(&args.poll)?;
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let keyword = args.endpoint.keyword.as_str();
    let hub = build_hub(&args.endpoint)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let started = Instant::now();
    let mut printed = 0usize;
    let result = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(SUCCESS);
        }
        for payload in hub.request(keyword) {
            print_update(keyword, &payload, format);
            printed = printed.saturating_add(1);
        }
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(SUCCESS);
        }
        if printed == 0 && timeout.is_some_and(|limit| started.elapsed() >= limit) {
            break Err(CliError::new(
                TIMEOUT,
                format!("no update for {keyword:?} within {:?}", started.elapsed()),
            ));
        }
        sleep_while_running(&running, poll);
    };

    debug!(keyword, printed, "subscription finished");
    hub.unsubscribe(keyword);
    result
}

fn build_hub(endpoint: &EndpointArgs) -> CliResult<SubscriberHub> {
    let keyword = endpoint.keyword.as_str();

    if let Some(path) = &endpoint.config {
        let config = HubConfig::from_file(path).map_err(|err| hub_error("config", err))?;
        let hub = SubscriberHub::from_config(&config).map_err(|err| hub_error("config", err))?;
        let subscribed = hub
            .addresses()
            .iter()
            .filter(|address| hub.subscribe(address, keyword))
            .count();
        if subscribed == 0 {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("subscribe failed: no endpoint accepted {keyword:?}"),
            ));
        }
        return Ok(hub);
    }

    let (Some(kind), Some(address)) = (endpoint.kind, endpoint.address.as_deref()) else {
        return Err(CliError::new(
            USAGE,
            "either KIND and ADDRESS or --config is required",
        ));
    };
    let mut transport = kind
        .subscriber()
        .map_err(|err| transport_error("subscribe failed", err))?;
    transport
        .subscribe(address, keyword)
        .map_err(|err| transport_error("subscribe failed", err))?;

    let hub = SubscriberHub::new();
    hub.add_receiver(address, transport);
    Ok(hub)
}
