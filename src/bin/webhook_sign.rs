//! Webhook digest calculator for gateway integration testing.
//!
//! Prints the canonical string, its MD5 digest and a ready-to-send body
//! for a notification, so operators can check the shared secret against
//! what the gateway sends.
//!
//! Usage:
//!   pix-webhook-sign --kind pix_payment --reference R --idempotent-id I --value-cents 200 --secret S

use clap::Parser;
use color_eyre::eyre::eyre;
use pix_reconcile::webhook::{canonical_string, md5_hex, NotificationKind, WebhookMessage};
use serde_json::json;

/// Compute the MD5 digest the gateway attaches to a webhook.
#[derive(Parser, Debug)]
#[command(name = "pix-webhook-sign")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Notification type (pix_payment, pix_qrcode, pix_static_qrcode).
    #[arg(long, default_value = "pix_payment")]
    kind: String,

    /// Reference code of the payment.
    #[arg(long)]
    reference: String,

    /// Idempotent id (pix_payment).
    #[arg(long)]
    idempotent_id: Option<String>,

    /// End-to-end id (pix_qrcode, pix_static_qrcode).
    #[arg(long)]
    end_to_end: Option<String>,

    /// Amount in cents.
    #[arg(long)]
    value_cents: i64,

    /// Status to put in the sample body.
    #[arg(long, default_value = "completed")]
    status: String,

    /// Shared webhook secret.
    #[arg(long, env = "PIX_WEBHOOK_SECRET", hide_env_values = true)]
    secret: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let kind = NotificationKind::parse(&args.kind);
    let message = WebhookMessage {
        value_cents: args.value_cents,
        reference_code: args.reference,
        idempotent_id: args.idempotent_id,
        end_to_end: args.end_to_end,
        status: Some(args.status),
        payment_date: None,
    };

    let canonical = canonical_string(&kind, &message, &args.secret)
        .ok_or_else(|| eyre!("notification type {} is not signed", args.kind))?;
    let digest = md5_hex(&canonical);

    let body = json!({
        "notification_type": kind.as_str(),
        "message": message,
        "md5": digest,
    });

    println!("canonical: {canonical}");
    println!("md5:       {digest}");
    println!();
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
