/// settlement replay - duplicated and out-of-order webhooks credit exactly once
use std::sync::Arc;

use campaign_ledger::{
    CampaignDraft, DonorInfo, FundingPlatform, LedgerConfig, MockGateway, Money, NewBankAccount,
    PaymentMethod, SafeTimeProvider, TimeSource, Uuid,
};
use chrono::{TimeZone, Utc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== settlement replay example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    ));
    let gateway = Arc::new(MockGateway::new("whsec_demo"));
    let platform = FundingPlatform::new(LedgerConfig::sandbox("whsec_demo"), gateway.clone());

    // payout accounts: the second one takes over as primary
    let institution = Uuid::new_v4();
    let today = time.now().date_naive();
    let mut first = NewBankAccount::new(institution, "BPI", "enc:v1:9f2c", "Alumni Association", today);
    first.is_primary = true;
    let first = platform.bank_accounts().create(first, &time)?;
    let second = platform.bank_accounts().create(
        NewBankAccount::new(institution, "BDO", "enc:v1:77aa", "Alumni Association", today),
        &time,
    )?;
    platform.bank_accounts().set_primary(second.id, &time)?;
    println!("primary moved from {} to {}", first.id, second.id);

    let draft = CampaignDraft::general(institution, Uuid::new_v4(), "New library wing", Money::from_major(3_000));
    let campaign = platform.campaigns().submit(draft, &time)?;
    platform.campaigns().approve(campaign.id, Uuid::new_v4(), None, &time)?;
    platform.campaigns().designate_payout_account(campaign.id, second.id, &time)?;

    // three donors start checkout
    let mut references = Vec::new();
    for (name, amount) in [("Ana", 1_000), ("Ben", 1_500), ("Cora", 500)] {
        let started = platform
            .checkout()
            .begin(
                campaign.id,
                DonorInfo::named(name, format!("{}@example.com", name.to_lowercase())),
                Money::from_major(amount),
                PaymentMethod::Checkout,
                &time,
            )
            .await?;
        println!("{name} redirected to {}", started.checkout_url);
        references.push(started.donation.reference);
    }

    // the gateway retries, reorders and reports one failure late
    let deliveries = [
        (0, "PAYMENT_SUCCESS"),
        (0, "PAYMENT_SUCCESS"),
        (2, "PAYMENT_FAILED"),
        (1, "PAYMENT_PROCESSING"),
        (1, "PAYMENT_SUCCESS"),
        (2, "PAYMENT_SUCCESS"),
        (1, "PAYMENT_SUCCESS"),
    ];
    for (index, status) in deliveries {
        let (body, signature) = gateway.signed_notification(&references[index], status)?;
        let ack = platform.settlement().handle(&body, Some(&signature), &time)?;
        println!("{:<20} {:<18} -> {:?}", references[index], status, ack);
    }

    let raised = platform.donations().audit_campaign(campaign.id)?;
    println!("\naudit ok, completed donations sum to {raised}");
    println!("{}", platform.campaign_summary(campaign.id)?.to_json_pretty()?);

    Ok(())
}
