// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RabbitMQ transport via `lapin`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
    BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use nested_protocol::{METHOD_HEADER, Properties};
use tracing::{debug, info, instrument};

use super::{Broker, BrokerChannel, BrokerError, Consumer, Delivery, SharedChannel};

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_) => BrokerError::ChannelClosed,
            other => BrokerError::Operation(other.to_string()),
        }
    }
}

/// A RabbitMQ connection.
pub struct AmqpBroker {
    connection: Connection,
}

impl AmqpBroker {
    #[instrument(skip(uri))]
    pub async fn connect(uri: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        info!("connected to AMQP broker");
        Ok(Self { connection })
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn open_channel(&self) -> Result<SharedChannel, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        debug!(channel = channel.id(), "opened AMQP channel with publisher confirms");
        Ok(Arc::new(AmqpChannel { channel }))
    }
}

/// One AMQP channel.
pub struct AmqpChannel {
    channel: Channel,
}

fn to_basic_properties(properties: &Properties) -> BasicProperties {
    let mut basic = BasicProperties::default();
    if let Some(id) = &properties.correlation_id {
        basic = basic.with_correlation_id(ShortString::from(id.clone()));
    }
    if let Some(queue) = &properties.reply_to {
        basic = basic.with_reply_to(ShortString::from(queue.clone()));
    }
    if let Some(method) = &properties.method {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(METHOD_HEADER),
            AMQPValue::LongString(method.as_str().into()),
        );
        basic = basic.with_headers(headers);
    }
    basic
}

fn from_basic_properties(basic: &BasicProperties) -> Properties {
    let method = basic.headers().as_ref().and_then(|headers| {
        headers
            .inner()
            .get(&ShortString::from(METHOD_HEADER))
            .and_then(|value| match value {
                AMQPValue::LongString(s) => {
                    Some(String::from_utf8_lossy(s.as_bytes()).into_owned())
                }
                AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
                _ => None,
            })
    });
    Properties {
        correlation_id: basic.correlation_id().as_ref().map(|s| s.as_str().to_string()),
        reply_to: basic.reply_to().as_ref().map(|s| s.as_str().to_string()),
        method,
    }
}

/// Every channel runs in confirm mode, so anything but an ack is a failure.
fn check_confirmation(queue: &str, confirmation: Confirmation) -> Result<(), BrokerError> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(BrokerError::Operation(format!(
            "broker nacked publish to '{queue}'"
        ))),
        Confirmation::NotRequested => Err(BrokerError::Operation(format!(
            "publish to '{queue}' was not confirmed: channel is not in confirm mode"
        ))),
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await?;
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        let options = QueueDeclareOptions {
            exclusive: true,
            auto_delete: true,
            ..Default::default()
        };
        let queue = self
            .channel
            .queue_declare("", options, FieldTable::default())
            .await?;
        Ok(queue.name().as_str().to_string())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        properties: Properties,
        body: Bytes,
    ) -> Result<(), BrokerError> {
        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                to_basic_properties(&properties),
            )
            .await?
            .await?;
        check_confirmation(queue, confirmation)
    }

    async fn consume(&self, queue: &str) -> Result<Consumer, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        let tag = consumer.tag().as_str().to_string();
        let deliveries = consumer
            .map(|item| {
                item.map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    properties: from_basic_properties(&delivery.properties),
                    body: Bytes::from(delivery.data),
                })
                .map_err(BrokerError::from)
            })
            .boxed();
        Ok(Consumer { tag, deliveries })
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close(200, "closing").await?;
        Ok(())
    }
}
