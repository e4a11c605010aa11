/*!
# Symbion DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test des agents Symbion sans infrastructure réelle:
- Stub cloud OpenStack (Keystone + Nova + Cinder) servi par axum en local
- Stub broker MQTT qui capture les messages publiés par l'agent
- Builders de fixtures JSON conformes aux réponses des APIs OpenStack
- Injection de pannes par ressource (HTTP 5xx, JSON invalide, service absent)
*/

pub mod cloud_stub;
pub mod fixtures;
pub mod mqtt_stub;

pub use cloud_stub::{CloudFixtures, Fault, Resource, StubCloud};
pub use mqtt_stub::{CapturedPublish, MqttBrokerStub};
