use daisy_protocol::{
    bits_to_bytes, decode_request, decode_stream, parse_bit_string, Decoded, RequestSubject,
};

use crate::cmd::DecodeArgs;
use crate::exit::{encode_error, protocol_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_decoded, print_request, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_input(&args.input)?;

    if args.request {
        let request =
            decode_request(&bytes).map_err(|err| protocol_error("decode failed", err))?;
        print_request(&request, format);
        return Ok(SUCCESS);
    }

    let pending = args
        .pending
        .as_deref()
        .map(RequestSubject::from_name)
        .transpose()
        .map_err(|err| encode_error("invalid --pending", err))?;

    let outcomes = decode_stream(&bytes, pending);
    print_decoded(&outcomes, format);

    if outcomes.iter().any(|o| matches!(o, Decoded::Error(_))) {
        Ok(DATA_INVALID)
    } else {
        Ok(SUCCESS)
    }
}

/// Accept `0x`-prefixed hex or a bit literal; bit literals are zero-padded
/// to whole bytes.
fn parse_input(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(hex) = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
    {
        return parse_hex(hex);
    }
    let bits = parse_bit_string(input).map_err(|err| protocol_error("invalid input", err))?;
    Ok(bits_to_bytes(&bits).to_vec())
}

fn parse_hex(hex: &str) -> CliResult<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex input must have an even number of digits: {hex}"),
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex input: {hex}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_literals_are_padded() {
        assert_eq!(
            parse_input("00 0000 0010 1000000").unwrap(),
            vec![0x00, 0xA0, 0x00]
        );
    }

    #[test]
    fn hex_input() {
        assert_eq!(parse_input("0x41c0").unwrap(), vec![0x41, 0xC0]);
        assert_eq!(parse_input("0x 41 C0").unwrap(), vec![0x41, 0xC0]);
        assert_eq!(parse_input("0x4").unwrap_err().code, USAGE);
        assert_eq!(parse_input("0xzz").unwrap_err().code, USAGE);
    }

    #[test]
    fn bad_literal_is_usage_error() {
        assert_eq!(parse_input("0102").unwrap_err().code, USAGE);
    }
}
