use std::time::Duration;

use daisy_board::{Board, BoardConfig};
use daisy_protocol::Request;
use daisy_transport::TransportConfig;

use crate::cmd::{parse_duration, runtime, PortArgs, RequestArgs};
use crate::exit::{board_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = args.target.to_request()?;
    runtime()?.block_on(send(&args.port, request, timeout, format))
}

async fn send(
    port: &PortArgs,
    request: Request,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let config = BoardConfig {
        request_timeout: Some(timeout),
        ..BoardConfig::default()
    };
    let (board, transport) = Board::open(port.connector(), TransportConfig::default(), config);

    let result = board.request(request).await;
    board.shutdown().await;
    transport.shutdown().await;

    let reply = result.map_err(|err| board_error("request failed", err))?;
    print_reply(request.subject(), &reply, format);
    Ok(SUCCESS)
}
