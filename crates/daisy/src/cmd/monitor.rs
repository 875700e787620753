use daisy_board::{Board, BoardConfig};
use daisy_transport::TransportConfig;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cmd::{runtime, MonitorArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_telemetry, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    runtime()?.block_on(monitor(args, format))
}

async fn monitor(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let (board, transport) = Board::open(
        args.port.connector(),
        TransportConfig::default(),
        BoardConfig::default(),
    );
    let mut telemetry = board.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    let code = loop {
        tokio::select! {
            _ = &mut ctrl_c => break SUCCESS,
            event = telemetry.recv() => match event {
                Ok(event) => {
                    print_telemetry(&event, format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        break SUCCESS;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "monitor fell behind; events dropped"),
                Err(RecvError::Closed) => break FAILURE,
            },
        }
    };

    let desyncs = board.desync_count();
    if desyncs > 0 {
        warn!(desyncs, "packets were dropped because of protocol errors");
    }
    board.shutdown().await;
    transport.shutdown().await;
    Ok(code)
}
