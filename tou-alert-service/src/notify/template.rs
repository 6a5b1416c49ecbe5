use tou_client::Category;

use super::AlertEmail;

const ADVISORY: &str = "Consider adjusting your electricity usage during this period.";

#[derive(Debug, Clone)]
pub struct AlertTemplate {
    pub from: String,
    pub subject: String,
    pub site_url: String,
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self {
            from: "Prabhawatt <alerts@prabhawatt.example>".to_string(),
            subject: "High Tariff Rate Alert!".to_string(),
            site_url: "https://prabhawatt.vercel.app/".to_string(),
        }
    }
}

impl AlertTemplate {
    pub fn render(&self, to: &str, category: Category, rate: f64) -> AlertEmail {
        let html_body = format!(
            "<p>Dear User,</p>\
             <p>The current {category} tariff rate has reached <b>{rate:.2}</b>, \
             which is higher than the normal threshold.</p>\
             <p>{ADVISORY}</p><br>\
             For more information, please visit <a href=\"{url}\">{url}</a>",
            url = self.site_url,
        );

        AlertEmail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: self.subject.clone(),
            html_body,
        }
    }
}
