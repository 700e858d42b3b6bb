//! State-changing admin calls (POST, no body).
//!
//! These need the CSRF credential. Without one, [`Commands`] cannot be built;
//! polling is unaffected.

use okse_admin_protocol::{
    delete_subscriber_endpoint, delete_topic_endpoint, path_segment, ConfigurationError,
    CsrfCredential, DELETE_ALL_TOPICS_ENDPOINT, ENCODING_ENDPOINT, PROTOCOL_POWER_ENDPOINT,
};

use crate::transport::{log_failure, Dispatcher, RequestDefinition};
use crate::views::SharedView;
use crate::ConsoleError;

pub struct Commands {
    dispatcher: Dispatcher,
    view: SharedView,
}

impl Commands {
    pub fn new(
        dispatcher: Dispatcher,
        view: SharedView,
        credential: Option<&CsrfCredential>,
    ) -> Result<Self, ConfigurationError> {
        if credential.is_none() {
            return Err(ConfigurationError::MissingCsrfCredential(
                "commands need a CSRF credential".into(),
            ));
        }
        Ok(Self { dispatcher, view })
    }

    /// Flip the protocol servers on or off, based on the last observed power
    /// state.
    pub fn toggle_protocol_power(&self) -> RequestDefinition {
        let running = self.view.read(|v| v.protocol_power).unwrap_or(false);
        let failure = if running {
            "Unable to stop the protocol servers"
        } else {
            "Unable to start the protocol servers"
        };
        tracing::info!(running, "Toggling protocol server power");
        self.issue(RequestDefinition::post(PROTOCOL_POWER_ENDPOINT), failure)
    }

    pub fn delete_topic(&self, topic: &str) -> Result<RequestDefinition, ConsoleError> {
        let topic = path_segment(topic).ok_or_else(|| ConsoleError::InvalidArgument {
            what: "topic name",
            value: topic.to_string(),
        })?;
        let def = self.issue(
            RequestDefinition::post(delete_topic_endpoint(topic)),
            "Unable to delete the topic",
        );
        self.view.update(|v| v.remove_topic(topic));
        Ok(def)
    }

    pub fn delete_subscriber(&self, subscriber_id: &str) -> Result<RequestDefinition, ConsoleError> {
        let id = path_segment(subscriber_id).ok_or_else(|| ConsoleError::InvalidArgument {
            what: "subscriber id",
            value: subscriber_id.to_string(),
        })?;
        let def = self.issue(
            RequestDefinition::post(delete_subscriber_endpoint(id)),
            "Unable to delete the subscriber",
        );
        self.view.update(|v| v.remove_subscriber(id));
        Ok(def)
    }

    pub fn delete_all_topics(&self) -> RequestDefinition {
        let def = self.issue(
            RequestDefinition::post(DELETE_ALL_TOPICS_ENDPOINT),
            "Unable to delete all topics",
        );
        self.view.update(|v| v.clear_topics());
        def
    }

    pub fn toggle_encoding(&self) -> RequestDefinition {
        self.issue(
            RequestDefinition::post(ENCODING_ENDPOINT),
            "Unable to change the chunked encoding setting",
        )
    }

    fn issue(&self, def: RequestDefinition, failure: &'static str) -> RequestDefinition {
        let view = self.view.clone();
        let def = def.with_error(move |failed| {
            view.display_message(failure);
            log_failure(failed);
        });
        self.dispatcher.send(&def);
        def
    }
}
