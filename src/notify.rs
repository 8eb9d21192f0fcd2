//! Notification dispatcher.
//!
//! The domain layer never sends mail. It enqueues a serializable
//! [`NotificationJob`] on a [`NotificationQueue`] and moves on; a
//! [`DeliveryWorker`] on its own thread renders the job and hands it to a
//! [`Mailer`]. Delivery failure surfaces as `CouldNotSendEmail` in the worker
//! log and never unwinds the committed domain transaction. At-least-once; no
//! idempotency key is kept for duplicate sends.

use std::sync::mpsc;
use std::thread::JoinHandle;

use super::error::PortalError;
use super::types::Language;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChangeType {
    #[n(0)]
    CompanyInvitation,
    #[n(1)]
    TaxpayerApproval,
    #[n(2)]
    TaxpayerChangeRequired,
    #[n(3)]
    TaxpayerDenial,
    #[n(4)]
    InvoiceStatusChange,
    #[n(5)]
    CommentPosted,
    #[n(6)]
    InvoiceEdited,
}

/// A queued delivery: everything the worker needs to render and send,
/// already resolved by the dispatching side.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct NotificationJob {
    #[n(0)]
    pub change_type: ChangeType,
    // language of the most recently associated company user, applied to the
    // whole job rather than per recipient
    #[n(1)]
    pub language: Language,
    #[n(2)]
    pub recipients: Vec<String>,
    #[n(3)]
    pub business_name: String,
    #[n(4)]
    pub invoice_number: String,
    #[n(5)]
    pub status_label: String,
    #[n(6)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Transport seam. Implementations deliver one rendered email or fail with
/// `CouldNotSendEmail`.
pub trait Mailer: Send + 'static {
    fn send(&self, email: &Email) -> Result<(), PortalError>;
}

/// Render a job's localized subject and body.
pub fn render(job: &NotificationJob) -> Email {
    let (subject, body) = match job.change_type {
        ChangeType::InvoiceStatusChange => match job.language {
            Language::En => (
                format!(
                    "Invoice {} changed status to {}",
                    job.invoice_number, job.status_label
                ),
                format!(
                    "The invoice {} from {} has changed its status to {}.\nThank you!",
                    job.invoice_number, job.business_name, job.status_label
                ),
            ),
            Language::Es => (
                format!(
                    "La factura {} cambió de estado a {}",
                    job.invoice_number, job.status_label
                ),
                format!(
                    "La factura {} de {} cambió de estado a {}.\n¡Gracias!",
                    job.invoice_number, job.business_name, job.status_label
                ),
            ),
            Language::PtBr => (
                format!(
                    "A fatura {} alterou o status para {}",
                    job.invoice_number, job.status_label
                ),
                format!(
                    "A fatura {} de {} alterou o status para {}.\nObrigado!",
                    job.invoice_number, job.business_name, job.status_label
                ),
            ),
        },
        ChangeType::CommentPosted => match job.language {
            Language::En => (
                format!("BriteSu Invoice {} commented", job.invoice_number),
                format!(
                    "You have a new comment on Invoice # {}. Please check your invoice. COMMENT:{}",
                    job.invoice_number, job.comment
                ),
            ),
            Language::Es => (
                format!("Factura de BriteSu {} comentada", job.invoice_number),
                format!(
                    "Tienes un nuevo comentario en la factura # {}. Por favor revise su factura. COMENTARIO:{}",
                    job.invoice_number, job.comment
                ),
            ),
            Language::PtBr => (
                format!("Fatura da BriteSu {} comentada", job.invoice_number),
                format!(
                    "Você tem um novo comentário na fatura # {}. Por favor, verifique sua fatura. COMENTE:{}",
                    job.invoice_number, job.comment
                ),
            ),
        },
        ChangeType::InvoiceEdited => match job.language {
            Language::En => (
                "BriteSu Invoice Edited".to_string(),
                format!(
                    "Your Invoice # {} was edited by an administrator. Please check your invoice",
                    job.invoice_number
                ),
            ),
            Language::Es => (
                "Factura de BriteSu editada".to_string(),
                format!(
                    "Tu factura # {} fue modificada por un administrador. Por favor revise su factura.",
                    job.invoice_number
                ),
            ),
            Language::PtBr => (
                "Fatura da BriteSu editada".to_string(),
                format!(
                    "Sua fatura # {} foi editada por um administrador. Verifique sua fatura",
                    job.invoice_number
                ),
            ),
        },
        ChangeType::TaxpayerApproval => match job.language {
            Language::En => (
                "Your taxpayer has been approved".to_string(),
                format!(
                    "The taxpayer {} was approved.\nSoon your contact will send you a Purchase Order Number.\nOnce you receive it, include it on your invoice as reference.\nThank you!",
                    job.business_name
                ),
            ),
            Language::Es => (
                "Su contribuyente ha sido aprobado".to_string(),
                format!(
                    "El contribuyente {} fue aprobado.\nPronto su contacto le enviará un número de orden de compra.\nCuando lo reciba, inclúyalo en su factura como referencia.\n¡Gracias!",
                    job.business_name
                ),
            ),
            Language::PtBr => (
                "Seu contribuinte foi aprovado".to_string(),
                format!(
                    "O contribuinte {} foi aprovado.\nEm breve seu contato enviará um número de pedido de compra.\nQuando recebê-lo, inclua-o na sua fatura como referência.\nObrigado!",
                    job.business_name
                ),
            ),
        },
        ChangeType::TaxpayerChangeRequired => match job.language {
            Language::En => (
                "Your taxpayer has some pending modifications".to_string(),
                format!(
                    "Please visit the taxpayer {} and read comments.\nOnce changes are done and approved,\nwe will send you an email.\nThank you!",
                    job.business_name
                ),
            ),
            Language::Es => (
                "Su contribuyente tiene modificaciones pendientes".to_string(),
                format!(
                    "Por favor visite el contribuyente {} y lea los comentarios.\nCuando los cambios estén hechos y aprobados,\nle enviaremos un correo.\n¡Gracias!",
                    job.business_name
                ),
            ),
            Language::PtBr => (
                "Seu contribuinte tem modificações pendentes".to_string(),
                format!(
                    "Visite o contribuinte {} e leia os comentários.\nAssim que as alterações forem feitas e aprovadas,\nenviaremos um e-mail.\nObrigado!",
                    job.business_name
                ),
            ),
        },
        ChangeType::TaxpayerDenial => match job.language {
            Language::En => (
                "Your taxpayer has been rejected".to_string(),
                format!(
                    "We are afraid that the taxpayer {} you were trying to submit is invalid.\nPlease contact the employee that hired you.\nThank you!",
                    job.business_name
                ),
            ),
            Language::Es => (
                "Su contribuyente ha sido rechazado".to_string(),
                format!(
                    "Lamentamos informarle que el contribuyente {} que intentó enviar es inválido.\nPor favor contacte al empleado que lo contrató.\n¡Gracias!",
                    job.business_name
                ),
            ),
            Language::PtBr => (
                "Seu contribuinte foi rejeitado".to_string(),
                format!(
                    "Lamentamos informar que o contribuinte {} que você tentou enviar é inválido.\nEntre em contato com o funcionário que o contratou.\nObrigado!",
                    job.business_name
                ),
            ),
        },
        ChangeType::CompanyInvitation => match job.language {
            Language::En => (
                "You have been invited to BriteSu".to_string(),
                "Welcome to BriteSu!\nPlease click on the following link to register.\nThank you!"
                    .to_string(),
            ),
            Language::Es => (
                "Ha sido invitado a BriteSu".to_string(),
                "¡Bienvenido a BriteSu!\nPor favor haga clic en el siguiente enlace para registrarse.\n¡Gracias!"
                    .to_string(),
            ),
            Language::PtBr => (
                "Você foi convidado para o BriteSu".to_string(),
                "Bem-vindo ao BriteSu!\nClique no link a seguir para se registrar.\nObrigado!"
                    .to_string(),
            ),
        },
    };

    Email {
        to: job.recipients.clone(),
        subject,
        body,
    }
}

/// Producer half of the queue, held by the service layer. Enqueueing never
/// blocks and never fails the domain operation.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationJob>,
}

impl NotificationQueue {
    pub fn new() -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: NotificationJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("notification queue is closed, dropping job");
        }
    }
}

/// Consumer half: drains the queue until it closes, delivering each job
/// through the mailer. Failures are logged and skipped.
pub struct DeliveryWorker;

impl DeliveryWorker {
    pub fn spawn<M: Mailer>(rx: mpsc::Receiver<NotificationJob>, mailer: M) -> JoinHandle<()> {
        std::thread::spawn(move || {
            for job in rx {
                let email = render(&job);
                if let Err(err) = mailer.send(&email) {
                    tracing::warn!(%err, subject = %email.subject, "failed to deliver notification");
                }
            }
        })
    }
}
