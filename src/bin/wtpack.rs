use std::error::Error;

use tracing_subscriber::EnvFilter;
use wtpack::{Decoder, Encoder, FieldSource, FieldType, FieldValue};

fn parse_field(field_type: FieldType, arg: &str) -> Result<FieldValue, Box<dyn Error>> {
    let value = if field_type.is_integer() {
        if field_type.is_signed() {
            FieldValue::Int(arg.parse()?)
        } else {
            FieldValue::UInt(arg.parse()?)
        }
    } else if field_type.is_string() {
        FieldValue::Str(arg.to_owned())
    } else {
        FieldValue::Bytes(hex::decode(arg)?)
    };
    Ok(value)
}

/// Byte arrays are given and printed as hex, everything else as text.
fn pack(format: &str, args: &[String]) -> Result<String, Box<dyn Error>> {
    let mut encoder = Encoder::new(format);
    for arg in args {
        let field_type = encoder.format().descriptor()?.field_type;
        encoder.add_field(&parse_field(field_type, arg)?)?;
    }
    Ok(hex::encode(encoder.as_bytes()))
}

fn unpack(format: &str, packed: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let data = hex::decode(packed)?;
    let fields = Decoder::new(format, &data).collect_fields()?;
    Ok(fields
        .into_iter()
        .map(|field| match field {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::UInt(v) => v.to_string(),
            FieldValue::Str(s) => s,
            FieldValue::Bytes(b) => hex::encode(b),
        })
        .collect())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} pack <format> <value>...", args[0]);
        eprintln!("       {} unpack <format> <hex>", args[0]);
        eprintln!("Example: {} pack iS 7 hello", args[0]);
        std::process::exit(1);
    }

    let format = &args[2];
    let result = match (args[1].as_str(), &args[3..]) {
        ("pack", values) => pack(format, values).map(|hex| vec![hex]),
        ("unpack", [packed]) => unpack(format, packed),
        (command, _) => Err(format!("unknown command or wrong arguments: {}", command).into()),
    };

    match result {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
