use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use daisy_protocol::{bytes_to_bits, Decoded, Reply, Request, RequestSubject, Response, Telemetry};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct TelemetryOutput<'a> {
    #[serde(flatten)]
    telemetry: &'a Telemetry,
    timestamp: String,
}

pub fn print_telemetry(telemetry: &Telemetry, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&TelemetryOutput {
            telemetry,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["EVENT", "SENSOR", "READING"]);
            table.add_row(vec![
                telemetry.subject().to_string(),
                telemetry.sensor_id().to_string(),
                reading(telemetry),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} sensor={} {}",
                telemetry.subject(),
                telemetry.sensor_id(),
                reading(telemetry)
            );
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    subject: RequestSubject,
    reply: &'a Reply,
}

pub fn print_reply(subject: RequestSubject, reply: &Reply, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput { subject, reply }),
        OutputFormat::Table => {
            let mut table = table(vec!["REQUEST", "RESULT"]);
            table.add_row(vec![subject.to_string(), describe_reply(reply)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{subject}: {}", describe_reply(reply)),
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    request: &'a Request,
    hex: String,
    bits: String,
    length: usize,
}

pub fn print_encoded(request: &Request, bytes: &[u8], format: OutputFormat) {
    let out = EncodedOutput {
        request,
        hex: hex(bytes),
        bits: bit_string(bytes),
        length: bytes.len(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table(vec!["REQUEST", "HEX", "BITS"]);
            table.add_row(vec![request.subject().to_string(), out.hex, out.bits]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{} {} ({})", request.subject(), out.hex, out.bits),
    }
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
enum DecodedOutput<'a> {
    Telemetry {
        #[serde(flatten)]
        telemetry: &'a Telemetry,
    },
    Response {
        #[serde(flatten)]
        response: &'a Response,
    },
    Error {
        error: String,
    },
    Request {
        #[serde(flatten)]
        request: &'a Request,
    },
}

pub fn print_decoded(outcomes: &[Decoded], format: OutputFormat) {
    let rows: Vec<DecodedOutput<'_>> = outcomes
        .iter()
        .map(|outcome| match outcome {
            Decoded::Telemetry(telemetry) => DecodedOutput::Telemetry { telemetry },
            Decoded::Response(response) => DecodedOutput::Response { response },
            Decoded::Error(err) => DecodedOutput::Error {
                error: err.to_string(),
            },
        })
        .collect();
    print_outcomes(&rows, format);
}

pub fn print_request(request: &Request, format: OutputFormat) {
    print_outcomes(&[DecodedOutput::Request { request }], format);
}

fn print_outcomes(rows: &[DecodedOutput<'_>], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = table(vec!["OUTCOME", "DETAIL"]);
            for row in rows {
                let (outcome, detail) = describe_outcome(row);
                table.add_row(vec![outcome.to_string(), detail]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                let (outcome, detail) = describe_outcome(row);
                println!("{outcome}: {detail}");
            }
        }
    }
}

fn describe_outcome(row: &DecodedOutput<'_>) -> (&'static str, String) {
    match row {
        DecodedOutput::Telemetry { telemetry } => (
            "telemetry",
            format!(
                "{} sensor={} {}",
                telemetry.subject(),
                telemetry.sensor_id(),
                reading(telemetry)
            ),
        ),
        DecodedOutput::Response { response } => match response {
            Response::Success { subject, reply } => {
                ("response", format!("{subject} ok: {}", describe_reply(reply)))
            }
            Response::Failure { subject, code } => (
                "response",
                format!("{subject} failed: {}", subject.failure_message(*code)),
            ),
        },
        DecodedOutput::Error { error } => ("error", error.clone()),
        DecodedOutput::Request { request } => ("request", format!("{request:?}")),
    }
}

fn reading(telemetry: &Telemetry) -> String {
    match telemetry {
        Telemetry::SoilMoisture { moisture, .. } => format!("moisture={moisture}"),
        Telemetry::Dht {
            humidity,
            temperature,
            ..
        } => format!("humidity={humidity}% temperature={temperature:.1}°C"),
        Telemetry::Ds18b20 { temperature, .. } => format!("temperature={temperature:.1}°C"),
    }
}

fn describe_reply(reply: &Reply) -> String {
    match reply {
        Reply::Done => "done".to_string(),
        Reply::RelayState { on } => format!("relay {}", if *on { "on" } else { "off" }),
        Reply::Moisture { moisture } => format!("moisture={moisture}"),
        Reply::Dht {
            humidity,
            temperature,
        } => format!("humidity={humidity}% temperature={temperature:.1}°C"),
        Reply::Temperature { temperature } => format!("temperature={temperature:.1}°C"),
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn bit_string(bytes: &[u8]) -> String {
    bytes_to_bits(bytes)
        .chunks(8)
        .map(|byte| {
            byte.iter()
                .map(|bit| if *bit { '1' } else { '0' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_bits_render_per_byte() {
        assert_eq!(hex(&[0x41, 0xC0]), "41c0");
        assert_eq!(bit_string(&[0x41, 0xC0]), "01000001 11000000");
    }

    #[test]
    fn telemetry_json_is_flat() {
        let out = TelemetryOutput {
            telemetry: &Telemetry::SoilMoisture {
                sensor_id: 2,
                moisture: 64,
            },
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["event"], "soil-moisture");
        assert_eq!(json["moisture"], 64);
        assert_eq!(json["timestamp"], "0");
    }
}
