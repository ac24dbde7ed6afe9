use crate::models::Service;

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;background:#fafafa;color:#333;margin:0;padding:0}\
.container{max-width:600px;margin:0 auto;padding:20px;background:#fff;border-radius:10px}\
.header{background:#4CAF50;color:#fff;padding:15px;text-align:center;font-size:22px;border-radius:10px 10px 0 0}\
.body{padding:20px;line-height:1.5}\
.code{font-size:28px;letter-spacing:6px;font-weight:bold;text-align:center}\
.footer{font-size:12px;color:#888;text-align:center;padding-top:10px}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<html><head><style>{STYLE}</style></head><body><div class=\"container\">\
<div class=\"header\">{title}</div><div class=\"body\">{body}</div>\
<div class=\"footer\">This is an automated message, please do not reply.</div>\
</div></body></html>"
    )
}

pub fn escape_html(input: &str) -> String {
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

pub fn otp_email(otp: &str, ttl_minutes: u64) -> (String, String) {
    let body = format!(
        "<p>Use the code below to verify your email address.</p>\
<p class=\"code\">{}</p><p>The code expires in {ttl_minutes} minutes.</p>",
        escape_html(otp)
    );
    ("Verify your Email".into(), layout("Email verification", &body))
}

pub fn reset_password_email(reset_url: &str, ttl_minutes: i64) -> (String, String) {
    let url = escape_html(reset_url);
    let body = format!(
        "<p>We received a request to reset your password.</p>\
<p><a href=\"{url}\">Reset your password</a></p>\
<p>The link expires in {ttl_minutes} minutes. If you did not ask for a reset, ignore this email.</p>"
    );
    ("Reset your password".into(), layout("Password reset", &body))
}

pub fn new_service_email(service: &Service, provider_name: &str) -> (String, String) {
    let category = service.category.as_deref().unwrap_or("Uncategorized");
    let body = format!(
        "<p>Hello {provider},</p><p>Your new service is now live.</p><ul>\
<li><strong>Name:</strong> {name}</li>\
<li><strong>Description:</strong> {description}</li>\
<li><strong>Category:</strong> {category}</li>\
<li><strong>Price:</strong> {price}</li>\
<li><strong>Duration:</strong> {duration} minutes</li>\
<li><strong>Preparation time:</strong> {prep} minutes</li>\
<li><strong>Cleanup time:</strong> {cleanup} minutes</li></ul>",
        provider = escape_html(provider_name),
        name = escape_html(&service.name),
        description = escape_html(&service.description),
        category = escape_html(category),
        price = service.price,
        duration = service.duration_minutes,
        prep = service.preparation_time_minutes,
        cleanup = service.cleanup_time_minutes,
    );
    (
        format!("New Service Created: {}", service.name),
        layout("New service created", &body),
    )
}
