//! Mandate CLI - developer utilities for keys, pre-signed envelopes, and an
//! end-to-end demo of the delegation flow.

use clap::{Parser, Subcommand};
use mandate::{
    Asset, Error, Ledger, NonceValue, Operation, PresignedEnvelope, PublicKey, SignedEnvelope,
    SigningKey, TransferIntent,
};
use std::io::{self, Read};

#[derive(Parser)]
#[command(name = "mandate")]
#[command(about = "Bounded delegation of spending authority", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an Ed25519 keypair for a principal
    Keygen {
        /// Variable name prefix for the shell-sourceable output
        #[arg(long, default_value = "KEY")]
        name: String,
    },

    /// Pre-sign a withdraw intent as the user
    Presign {
        /// User's private key (hex)
        #[arg(short = 'k', long = "user-key", required = true)]
        user_key: String,

        /// Delegate's public key (hex)
        #[arg(short = 'd', long = "delegate", required = true)]
        delegate: String,

        /// Nonce token ID the intent is bound to
        #[arg(long = "nonce-id", required = true)]
        nonce_id: String,

        /// Nonce token value at build time (hex, 32 bytes)
        #[arg(long = "nonce-value", required = true)]
        nonce_value: String,

        /// Amount to withdraw
        #[arg(short = 'a', long = "amount", required = true)]
        amount: u64,

        /// Destination public key (hex). Defaults to the delegate.
        #[arg(long = "destination")]
        destination: Option<String>,
    },

    /// Countersign a presigned envelope as the delegate
    Countersign {
        /// Base64 presigned envelope. Use - to read from stdin.
        envelope: String,

        /// Delegate's private key (hex)
        #[arg(short = 'k', long = "delegate-key", required = true)]
        delegate_key: String,
    },

    /// Decode an envelope and print its intent as JSON
    Inspect {
        /// Base64 envelope (presigned or signed). Use - to read from stdin.
        envelope: String,
    },

    /// Run the full grant / presign / redeem flow in memory
    Demo,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Keygen { name } => {
            let key = SigningKey::generate();
            let name = name.to_uppercase();
            println!(
                "export {}_PRIVATE_KEY={}",
                name,
                hex::encode(key.secret_key_bytes())
            );
            println!(
                "export {}_PUBLIC_KEY={}",
                name,
                hex::encode(key.public_key().to_bytes())
            );
        }

        Commands::Presign {
            user_key,
            delegate,
            nonce_id,
            nonce_value,
            amount,
            destination,
        } => {
            let user = parse_signing_key(&user_key)?;
            let delegate = parse_public_key(&delegate)?;
            let destination = match destination {
                Some(d) => parse_public_key(&d)?,
                None => delegate,
            };
            let value = parse_nonce_value(&nonce_value)?;

            let presigned = TransferIntent::builder()
                .nonce(nonce_id, value)
                .parties(user.public_key(), delegate)
                .operation(Operation::Withdraw {
                    user: user.public_key(),
                    asset: Asset::Native,
                    amount,
                    destination,
                })
                .sign(&user)?;
            println!("{}", presigned.encode_base64()?);
        }

        Commands::Countersign {
            envelope,
            delegate_key,
        } => {
            let encoded = read_arg_or_stdin(&envelope)?;
            let delegate = parse_signing_key(&delegate_key)?;
            let presigned = PresignedEnvelope::decode_base64(&encoded)?;
            let signed = presigned.countersign(&delegate)?;
            println!("{}", signed.encode_base64()?);
        }

        Commands::Inspect { envelope } => {
            let encoded = read_arg_or_stdin(&envelope)?;
            // Signed envelopes are a superset; try them first.
            let intent = match SignedEnvelope::decode_base64(&encoded) {
                Ok(signed) => signed.verify()?,
                Err(_) => PresignedEnvelope::decode_base64(&encoded)?.intent()?,
            };
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }

        Commands::Demo => demo()?,
    }
    Ok(())
}

fn demo() -> mandate::Result<()> {
    let admin = SigningKey::generate();
    let user = SigningKey::generate();
    let bot = SigningKey::generate();

    let mut ledger = Ledger::new(admin.public_key());
    ledger.credit(&user.public_key(), &Asset::Native, 10_000)?;

    println!("== grant ==");
    let event = ledger.apply(
        &admin.public_key(),
        Operation::Grant {
            user: user.public_key(),
            delegate: bot.public_key(),
            max_amount: 1_000,
            duration_days: 1,
        },
    )?;
    println!("{:?}", event);

    println!("== presign ==");
    let nonce_id = ledger.create_nonce(bot.public_key());
    let presigned = TransferIntent::builder()
        .nonce(nonce_id.clone(), ledger.nonce_value(&nonce_id)?)
        .parties(user.public_key(), bot.public_key())
        .operation(Operation::Withdraw {
            user: user.public_key(),
            asset: Asset::Native,
            amount: 750,
            destination: bot.public_key(),
        })
        .sign(&user)?;
    println!("envelope: {}", presigned.encode_base64()?);

    println!("== redeem ==");
    let signed = presigned.countersign(&bot)?;
    let event = ledger.redeem(&signed)?;
    println!("{:?}", event);
    println!(
        "user balance: {}, bot balance: {}",
        ledger.balance(&user.public_key(), &Asset::Native),
        ledger.balance(&bot.public_key(), &Asset::Native)
    );

    println!("== replay ==");
    match ledger.redeem(&signed) {
        Err(e @ Error::StaleNonce { .. }) => println!("rejected as expected: {}", e),
        other => println!("unexpected outcome: {:?}", other),
    }
    Ok(())
}

fn parse_signing_key(hex_str: &str) -> mandate::Result<SigningKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| Error::CryptoError(format!("invalid private key hex: {}", e)))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::CryptoError("private key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&arr))
}

fn parse_public_key(hex_str: &str) -> mandate::Result<PublicKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| Error::CryptoError(format!("invalid public key hex: {}", e)))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::CryptoError("public key must be 32 bytes".into()))?;
    PublicKey::from_bytes(&arr)
}

fn parse_nonce_value(hex_str: &str) -> mandate::Result<NonceValue> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| Error::CryptoError(format!("invalid nonce value hex: {}", e)))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::CryptoError("nonce value must be 32 bytes".into()))?;
    Ok(NonceValue::from_bytes(arr))
}

fn read_arg_or_stdin(arg: &str) -> io::Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf.trim().to_string())
    } else {
        Ok(arg.to_string())
    }
}
