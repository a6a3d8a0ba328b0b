//! Publish notification events for attendance updates.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{
    BasicProperties, Channel as AmqpChannel, Connection, ConnectionProperties,
    RecoveryConfig,
};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use url::Url;

use crate::attendance::Status;
use crate::config::Amqp;
use crate::error::{Result, ServerError};
use crate::user::User;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

/// Templates understood by the delivery worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// Someone recorded or corrected the recipient's attendance.
    StatusChanged,
    /// Nudge the recipient to mark today's attendance.
    Reminder,
    /// The nightly sweep recorded the recipient absent.
    AbsenceRecorded,
}

/// Delivery channels the worker routes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    channel: Channel,
    to: &'a str,
    name: &'a str,
    template: Template,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marked_by: Option<&'a str>,
}

/// Captured dispatch for assertions.
#[cfg(test)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    pub template: Template,
    pub channel: Channel,
    pub to: String,
}

/// Notification event publisher.
///
/// Without a queue connection every publish is a silent no-op, so the
/// API keeps working when RabbitMQ is not configured.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    queue: String,
    conn: Option<Arc<Connection>>,
    #[cfg(test)]
    log: Option<Arc<std::sync::Mutex<Vec<Recorded>>>>,
}

impl Notifier {
    /// Create a new [`Notifier`].
    pub async fn new(config: &Amqp) -> Result<Self> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme())
                .map_err(|_| ServerError::InvalidScheme)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let recovery_config =
            RecoveryConfig::default().auto_recover_connection();
        let conn_config = ConnectionProperties::default()
            .with_connection_name("rollcall_notify_client".into())
            .with_experimental_recovery_config(recovery_config);
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            conn: Some(Arc::new(conn)),
            #[cfg(test)]
            log: None,
        })
    }

    /// [`Notifier`] capturing every dispatch instead of publishing it.
    #[cfg(test)]
    pub fn recording() -> (Self, Arc<std::sync::Mutex<Vec<Recorded>>>) {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Self {
                log: Some(Arc::clone(&log)),
                ..Default::default()
            },
            log,
        )
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<AmqpChannel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        let id = Alphanumeric.sample_string(&mut OsRng, ID_LENGTH);
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.rollcall.notification",
            source: "com.rollcall.api",
            id,
            time: Utc::now().with_timezone(&Utc).to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }

    /// Tell `user` that `marker` recorded their attendance.
    pub async fn status_changed(
        &self,
        user: &User,
        status: Status,
        date: NaiveDate,
        marker: &str,
    ) -> Result<()> {
        for channel in enabled_channels(user) {
            self.publish(Content {
                channel,
                to: destination(user, channel),
                name: &user.name,
                template: Template::StatusChanged,
                status: Some(status),
                date: Some(date),
                marked_by: Some(marker),
            })
            .await?;
        }

        Ok(())
    }

    /// Nudge `user` to mark attendance for `date`.
    pub async fn reminder(&self, user: &User, date: NaiveDate) -> Result<()> {
        for channel in enabled_channels(user) {
            self.publish(Content {
                channel,
                to: destination(user, channel),
                name: &user.name,
                template: Template::Reminder,
                status: None,
                date: Some(date),
                marked_by: None,
            })
            .await?;
        }

        Ok(())
    }

    /// Tell `user` the nightly sweep recorded them absent.
    ///
    /// Goes out on email only, never SMS.
    pub async fn absence_recorded(
        &self,
        user: &User,
        date: NaiveDate,
    ) -> Result<()> {
        if !user.notifications.email {
            return Ok(());
        }

        self.publish(Content {
            channel: Channel::Email,
            to: &user.email,
            name: &user.name,
            template: Template::AbsenceRecorded,
            status: None,
            date: Some(date),
            marked_by: None,
        })
        .await
    }

    async fn publish(&self, message: Content<'_>) -> Result<()> {
        #[cfg(test)]
        if let Some(log) = &self.log {
            log.lock().unwrap().push(Recorded {
                template: message.template,
                channel: message.channel,
                to: message.to.to_owned(),
            });
        }

        let Some(conn) = &self.conn else {
            tracing::debug!(
                template = ?message.template,
                "notification dropped, queue not configured"
            );
            return Ok(());
        };
        let channel =
            Self::create_channel(Arc::clone(conn), &self.queue).await?;

        tracing::trace!(template = ?message.template, "event sent");

        let payload = Self::create_event(message);
        let payload = serde_json::to_string(&payload)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?;

        Ok(())
    }
}

/// Channels the user opted into, in dispatch order.
fn enabled_channels(user: &User) -> Vec<Channel> {
    let mut channels = Vec::with_capacity(2);
    if user.notifications.email {
        channels.push(Channel::Email);
    }
    if user.notifications.sms {
        channels.push(Channel::Sms);
    }
    channels
}

fn destination(user: &User, channel: Channel) -> &str {
    match channel {
        Channel::Email => &user.email,
        Channel::Sms => &user.phone,
    }
}
