/// quick start - submit, approve, donate and settle one campaign
use std::sync::Arc;

use campaign_ledger::settlement::GatewayNotification;
use campaign_ledger::{
    CampaignDraft, DonorInfo, FundingPlatform, LedgerConfig, MockGateway, Money, PaymentMethod,
    SafeTimeProvider, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let platform = FundingPlatform::new(
        LedgerConfig::sandbox("whsec_demo"),
        Arc::new(MockGateway::new("whsec_demo")),
    );

    // a ₱10,000 scholarship campaign
    let institution = Uuid::new_v4();
    let draft = CampaignDraft::general(institution, Uuid::new_v4(), "Scholarship fund", Money::from_major(10_000));
    let campaign = platform.campaigns().submit(draft, &time)?;

    // committee approves it
    platform.campaigns().approve(campaign.id, Uuid::new_v4(), Some("documents complete"), &time)?;

    // a donor gives the full amount
    let donation = platform.donations().open(
        campaign.id,
        DonorInfo::named("Ana Cruz", "ana@example.com"),
        Money::from_major(10_000),
        PaymentMethod::Checkout,
        &time,
    )?;

    // gateway confirms the payment
    let notification = GatewayNotification {
        status: "PAYMENT_SUCCESS".to_string(),
        request_reference_number: donation.reference.clone(),
    };
    platform.settlement().handle_notification(&notification, &time)?;

    println!("{}", platform.campaign_summary(campaign.id)?.to_json_pretty()?);
    println!("{}", platform.donation_receipt(&donation.reference)?.to_json_pretty()?);

    Ok(())
}
