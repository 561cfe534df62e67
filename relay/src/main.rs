use std::io::Read;

use structopt::StructOpt;

use sendgrid_api::email::Email;
use sendgrid_api::{config, Error, SendgridClient, Transport};

mod status;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sendgrid-relay",
    about = "Postfix content filter that relays mail through the SendGrid Web API."
)]
struct Opt {
    /// Envelope sender; overrides the From header
    #[structopt(short, long)]
    sender: Option<String>,

    /// Envelope recipients; replace the To, Cc and Bcc headers
    #[structopt(short, long)]
    recipients: Vec<String>,

    /// TOML config file (defaults to /etc/sendgrid/relay.toml if present)
    #[structopt(short, long)]
    config: Option<String>,
}

fn build_email(raw: &[u8], opt: &Opt) -> Result<Email, Error> {
    let mut mail = Email::from_mime(raw)?;

    if let Some(sender) = &opt.sender {
        mail = mail.with_sender(sender.as_str());
    }

    // The envelope is the full recipient set for this run. Cc/Bcc headers
    // would make SendGrid send to those addresses a second time.
    if !opt.recipients.is_empty() {
        mail = mail.with_recipients(opt.recipients.iter().map(String::as_str));
        mail.cc.clear();
        mail.bcc.clear();
    }

    Ok(mail)
}

/// Relay this email through SendGrid, once
async fn process<T: Transport>(transport: &T, mail: &Email) -> Result<(), Error> {
    let receipt = transport.deliver(mail).await?;

    log::info!(
        "Relayed \"{}\" (status {}, message id {})",
        mail.subject,
        receipt.status,
        receipt.message_id.as_deref().unwrap_or("none")
    );

    Ok(())
}

async fn run(opt: Opt) -> Result<(), Error> {
    // Get message body from stdin
    let mut raw = Vec::new();
    std::io::stdin()
        .read_to_end(&mut raw)
        .map_err(|e| Error::Mime(format!("failed to read message from stdin: {}", e)))?;

    let mail = build_email(&raw, &opt)?;

    let settings = config::load_config(opt.config.as_deref())?;
    let client = SendgridClient::new(settings)?;

    process(&client, &mail).await
}

#[tokio::main]
async fn main() {
    // Init logger
    env_logger::builder().format_timestamp_micros().init();

    let opt = Opt::from_args();

    let code = match run(opt).await {
        Ok(()) => status::OK,
        Err(err) => {
            log::error!("{}", err);

            if let Some(code) = status::enhanced_code(&err) {
                println!("{}: {}", code, err);
            }

            status::exit_code(&err)
        }
    };

    std::process::exit(code);
}
