//! Notification templates. Pure functions from template data to subject,
//! HTML and plain-text bodies.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::ReminderType;
use crate::services::stock_alert::StockAlertKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ReminderTemplateData<'a> {
    pub tenant_name: &'a str,
    pub rental_id: Uuid,
    pub cube_id: Uuid,
    pub reminder_type: ReminderType,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct StockAlertTemplateData<'a> {
    pub tenant_name: &'a str,
    pub product_name: &'a str,
    pub variant_name: &'a str,
    pub barcode: Option<&'a str>,
    pub stock: i32,
    pub threshold: i32,
    pub kind: StockAlertKind,
}

pub fn render_reminder(data: &ReminderTemplateData<'_>) -> RenderedTemplate {
    let due = data.due_date.format("%d %b %Y").to_string();
    let amount = format!("{:.2}", data.amount);

    let (subject, headline) = match data.reminder_type {
        ReminderType::SevenDayAdvance => (
            format!("Upcoming rent payment due on {}", due),
            format!("Your next rent payment is due on {}.", due),
        ),
        ReminderType::OneDayDue => (
            format!("Rent payment due tomorrow ({})", due),
            format!("Your rent payment is due tomorrow, {}.", due),
        ),
        ReminderType::Overdue => (
            format!("Overdue rent payment since {}", due),
            format!("Your rent payment due on {} is overdue.", due),
        ),
    };

    let text = format!(
        "Hello {name},\n\n{headline}\nAmount: {amount}\nCube: {cube}\nRental reference: {rental}\n\n\
         If you have already paid, please ignore this message.\n",
        name = data.tenant_name,
        headline = headline,
        amount = amount,
        cube = data.cube_id,
        rental = data.rental_id,
    );

    let html = format!(
        "<p>Hello {name},</p>\
         <p>{headline}</p>\
         <table>\
         <tr><td>Amount</td><td><strong>{amount}</strong></td></tr>\
         <tr><td>Cube</td><td>{cube}</td></tr>\
         <tr><td>Rental reference</td><td>{rental}</td></tr>\
         </table>\
         <p>If you have already paid, please ignore this message.</p>",
        name = escape_html(data.tenant_name),
        headline = escape_html(&headline),
        amount = amount,
        cube = data.cube_id,
        rental = data.rental_id,
    );

    RenderedTemplate {
        subject,
        html,
        text,
    }
}

pub fn render_stock_alert(data: &StockAlertTemplateData<'_>) -> RenderedTemplate {
    let item = format!("{} ({})", data.product_name, data.variant_name);

    let (subject, headline) = match data.kind {
        StockAlertKind::OutOfStock => (
            format!("Out of stock: {}", item),
            format!("{} has sold out.", item),
        ),
        StockAlertKind::LowStock => (
            format!("Low stock: {}", item),
            format!(
                "{} is running low: {} left (alert threshold {}).",
                item, data.stock, data.threshold
            ),
        ),
    };

    let barcode = data.barcode.unwrap_or("-");

    let text = format!(
        "Hello {name},\n\n{headline}\nBarcode: {barcode}\nCurrent stock: {stock}\n\n\
         Restock soon to keep the item available at the counter.\n",
        name = data.tenant_name,
        headline = headline,
        barcode = barcode,
        stock = data.stock,
    );

    let html = format!(
        "<p>Hello {name},</p>\
         <p>{headline}</p>\
         <p>Barcode: {barcode}<br>Current stock: <strong>{stock}</strong></p>\
         <p>Restock soon to keep the item available at the counter.</p>",
        name = escape_html(data.tenant_name),
        headline = escape_html(&headline),
        barcode = escape_html(barcode),
        stock = data.stock,
    );

    RenderedTemplate {
        subject,
        html,
        text,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder(kind: ReminderType) -> RenderedTemplate {
        render_reminder(&ReminderTemplateData {
            tenant_name: "Nook & Cranny",
            rental_id: Uuid::nil(),
            cube_id: Uuid::nil(),
            reminder_type: kind,
            amount: Decimal::from(140),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 29).unwrap(),
        })
    }

    #[test]
    fn test_reminder_subjects_differ_by_kind() {
        assert_eq!(
            reminder(ReminderType::SevenDayAdvance).subject,
            "Upcoming rent payment due on 29 Jan 2024"
        );
        assert_eq!(
            reminder(ReminderType::OneDayDue).subject,
            "Rent payment due tomorrow (29 Jan 2024)"
        );
        assert_eq!(
            reminder(ReminderType::Overdue).subject,
            "Overdue rent payment since 29 Jan 2024"
        );
    }

    #[test]
    fn test_reminder_bodies_show_amount_and_escape_names() {
        let rendered = reminder(ReminderType::OneDayDue);
        assert!(rendered.text.contains("Amount: 140.00"));
        assert!(rendered.text.contains("Hello Nook & Cranny"));
        assert!(rendered.html.contains("Nook &amp; Cranny"));
    }

    #[test]
    fn test_stock_alert_templates() {
        let data = StockAlertTemplateData {
            tenant_name: "Potter",
            product_name: "Mug",
            variant_name: "Blue <large>",
            barcode: Some("4006381333931"),
            stock: 2,
            threshold: 5,
            kind: StockAlertKind::LowStock,
        };
        let low = render_stock_alert(&data);
        assert_eq!(low.subject, "Low stock: Mug (Blue <large>)");
        assert!(low.text.contains("2 left (alert threshold 5)"));
        assert!(low.html.contains("Blue &lt;large&gt;"));

        let out = render_stock_alert(&StockAlertTemplateData {
            stock: 0,
            kind: StockAlertKind::OutOfStock,
            ..data
        });
        assert_eq!(out.subject, "Out of stock: Mug (Blue <large>)");
    }
}
