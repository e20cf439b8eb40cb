//! Serializable read models for campaigns and donations.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::Campaign;
use crate::decimal::{Money, Rate};
use crate::donation::Donation;
use crate::types::{CampaignId, CampaignPriority, CampaignStatus, CampaignType, DonationId, DonationStatus, PaymentMethod};

const ANONYMOUS: &str = "Anonymous";

/// campaign progress as shown to donors and committees
#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: CampaignId,
    pub title: String,
    pub status: CampaignStatus,
    pub campaign_type: CampaignType,
    pub priority: CampaignPriority,
    pub end_date: Option<NaiveDate>,
    pub funding: FundingView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FundingView {
    pub goal_amount: Money,
    pub raised_amount: Money,
    pub remaining: Money,
    pub progress: Rate,
    pub completed_donations: u32,
    /// named donors counted once; anonymous gifts are not counted
    pub distinct_donors: u32,
    pub last_donation_at: Option<DateTime<Utc>>,
}

impl CampaignSummary {
    pub fn from_campaign(campaign: &Campaign, donations: &[Donation]) -> Self {
        let completed: Vec<&Donation> = donations
            .iter()
            .filter(|d| d.campaign_id == campaign.id && d.status() == DonationStatus::Completed)
            .collect();
        let donors: HashSet<String> = completed
            .iter()
            .filter(|d| !d.is_anonymous)
            .filter_map(|d| {
                d.donor_id
                    .map(|id| id.to_string())
                    .or_else(|| d.donor_email.as_ref().map(|e| e.to_lowercase()))
            })
            .collect();

        CampaignSummary {
            id: campaign.id,
            title: campaign.title.clone(),
            status: campaign.status(),
            campaign_type: campaign.campaign_type,
            priority: campaign.priority,
            end_date: campaign.end_date,
            funding: FundingView {
                goal_amount: campaign.goal_amount,
                raised_amount: campaign.raised_amount(),
                remaining: campaign.remaining(),
                progress: campaign.progress(),
                completed_donations: completed.len() as u32,
                distinct_donors: donors.len() as u32,
                last_donation_at: completed.iter().filter_map(|d| d.settled_at).max(),
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// donor-facing receipt; hides donor identity for anonymous gifts
#[derive(Debug, Serialize, Deserialize)]
pub struct DonationReceipt {
    pub donation_id: DonationId,
    pub reference: String,
    pub campaign_id: CampaignId,
    pub campaign_title: String,
    pub amount: Money,
    pub status: DonationStatus,
    pub payment_method: PaymentMethod,
    pub donor_display_name: String,
    pub message: Option<String>,
    pub donated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl DonationReceipt {
    pub fn from_donation(donation: &Donation, campaign: &Campaign) -> Self {
        let donor_display_name = if donation.is_anonymous {
            ANONYMOUS.to_string()
        } else {
            donation
                .donor_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(ANONYMOUS)
                .to_string()
        };

        DonationReceipt {
            donation_id: donation.id,
            reference: donation.reference.clone(),
            campaign_id: campaign.id,
            campaign_title: campaign.title.clone(),
            amount: donation.amount,
            status: donation.status(),
            payment_method: donation.payment_method.clone(),
            donor_display_name,
            message: donation.message.clone(),
            donated_at: donation.created_at,
            settled_at: donation.settled_at,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
