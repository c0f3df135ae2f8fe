//! Prompts and the JSON schema sent with every extraction request.

use serde_json::{json, Value};

/// System prompt. Identical across calls so the API can cache it.
pub const SYSTEM_PROMPT: &str = "\
You extract structured data from receipts and invoices.

The user message contains raw OCR text of a single receipt. OCR output may be
out of order, split across lines, or contain recognition errors. Read it as a
whole and fill in the receipt fields.

Rules:
- merchant_name: the store or company that issued the receipt, as printed.
- date: the purchase date as YYYY-MM-DD. Convert ROC calendar years
  (e.g. 民國113年 or 113/12/28) by adding 1911.
- total_amount: the final amount paid, after discounts and including tax.
- currency: ISO 4217 code. Use TWD when the receipt does not state one.
- items: line items in printed order. Leave quantity, unit_price or amount
  out when they are not printed.
- tax, payment_method, invoice_number: only when printed. Taiwanese uniform
  invoice numbers look like AB-12345678.
- confidence_score: between 0.0 and 1.0, how sure you are that merchant,
  date and total are correct. Lower it when the text is garbled.
- raw_text: the OCR text exactly as given.

Never invent values that are not supported by the text.";

/// User message wrapping the OCR text.
pub fn user_prompt(ocr_text: &str) -> String {
    format!(
        "Extract the receipt data from this OCR text:\n\n<ocr_text>\n{}\n</ocr_text>",
        ocr_text
    )
}

fn nullable(kind: &str) -> Value {
    json!({ "anyOf": [{ "type": kind }, { "type": "null" }] })
}

/// JSON schema of a receipt as the model must return it.
pub fn receipt_schema() -> Value {
    let item = json!({
        "type": "object",
        "properties": {
            "description": { "type": "string" },
            "quantity": nullable("number"),
            "unit_price": nullable("number"),
            "amount": nullable("number"),
        },
        "required": ["description"],
        "additionalProperties": false,
    });

    json!({
        "type": "object",
        "properties": {
            "merchant_name": { "type": "string" },
            "date": { "type": "string", "format": "date" },
            "total_amount": { "type": "number" },
            "currency": { "type": "string" },
            "items": { "type": "array", "items": item },
            "tax": nullable("number"),
            "payment_method": nullable("string"),
            "invoice_number": nullable("string"),
            "confidence_score": {
                "type": "number",
                "description": "Between 0.0 and 1.0",
            },
            "raw_text": { "type": "string" },
        },
        "required": ["merchant_name", "date", "total_amount", "confidence_score", "raw_text"],
        "additionalProperties": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_embeds_text() {
        let prompt = user_prompt("7-ELEVEN\n總計 $45");
        assert!(prompt.contains("<ocr_text>\n7-ELEVEN\n總計 $45\n</ocr_text>"));
    }

    #[test]
    fn test_schema_requires_core_fields() {
        let schema = receipt_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();

        assert!(required.contains(&"merchant_name"));
        assert!(required.contains(&"confidence_score"));
        assert!(!required.contains(&"currency"));
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["items"]["items"]["additionalProperties"], false);
    }

    #[test]
    fn test_schema_has_no_provenance_field() {
        assert!(receipt_schema()["properties"].get("file_id").is_none());
    }
}
