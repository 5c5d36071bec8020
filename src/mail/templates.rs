//! Pre-written account emails in every supported language.

use crate::auth::repo_types::Language;

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
}

struct Wording {
    subject: &'static str,
    greeting: &'static str,
    body: &'static str,
    action: &'static str,
    footer: &'static str,
}

fn reset_wording(lang: Language) -> Wording {
    match lang {
        Language::En => Wording {
            subject: "Reset your password",
            greeting: "Hello",
            body: "We received a request to reset your password. The link below is valid for one hour.",
            action: "Reset password",
            footer: "If you did not ask for this, you can ignore this email.",
        },
        Language::Es => Wording {
            subject: "Restablece tu contraseña",
            greeting: "Hola",
            body: "Recibimos una solicitud para restablecer tu contraseña. El enlace es válido durante una hora.",
            action: "Restablecer contraseña",
            footer: "Si no lo solicitaste, puedes ignorar este correo.",
        },
        Language::Tr => Wording {
            subject: "Şifrenizi sıfırlayın",
            greeting: "Merhaba",
            body: "Şifrenizi sıfırlamak için bir istek aldık. Aşağıdaki bağlantı bir saat geçerlidir.",
            action: "Şifreyi sıfırla",
            footer: "Bu isteği siz yapmadıysanız bu e-postayı yok sayabilirsiniz.",
        },
    }
}

fn verification_wording(lang: Language) -> Wording {
    match lang {
        Language::En => Wording {
            subject: "Verify your email address",
            greeting: "Hello",
            body: "Please confirm your email address. The link below is valid for 24 hours.",
            action: "Verify email",
            footer: "If you did not create an account, you can ignore this email.",
        },
        Language::Es => Wording {
            subject: "Verifica tu correo electrónico",
            greeting: "Hola",
            body: "Confirma tu dirección de correo. El enlace es válido durante 24 horas.",
            action: "Verificar correo",
            footer: "Si no creaste una cuenta, puedes ignorar este correo.",
        },
        Language::Tr => Wording {
            subject: "E-posta adresinizi doğrulayın",
            greeting: "Merhaba",
            body: "Lütfen e-posta adresinizi onaylayın. Aşağıdaki bağlantı 24 saat geçerlidir.",
            action: "E-postayı doğrula",
            footer: "Bir hesap oluşturmadıysanız bu e-postayı yok sayabilirsiniz.",
        },
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn render(w: Wording, name: &str, link: &str) -> Rendered {
    let html = format!(
        "<p>{greeting} {name},</p>\
         <p>{body}</p>\
         <p><a href=\"{link}\">{action}</a></p>\
         <p>{footer}</p>",
        greeting = w.greeting,
        name = escape(name),
        body = w.body,
        link = escape(link),
        action = w.action,
        footer = w.footer,
    );
    Rendered {
        subject: w.subject.to_string(),
        html,
    }
}

pub fn password_reset(lang: Language, name: &str, link: &str) -> Rendered {
    render(reset_wording(lang), name, link)
}

pub fn email_verification(lang: Language, name: &str, link: &str) -> Rendered {
    render(verification_wording(lang), name, link)
}
