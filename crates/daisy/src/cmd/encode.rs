use daisy_protocol::encode_request;

use crate::cmd::EncodeArgs;
use crate::exit::{encode_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let request = args.target.to_request()?;
    let bytes = encode_request(&request).map_err(|err| encode_error("encode failed", err))?;
    print_encoded(&request, &bytes, format);
    Ok(SUCCESS)
}
