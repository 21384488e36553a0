/*!
# Suraxit DevKit - Outils de développement pour la passerelle et les nœuds

Bibliothèque partagée par le simulateur de nœuds et les tests avec:
- Constantes et paquet d'urgence du protocole mesh
- Constructeurs de payloads JSON
- Client HTTP qui enregistre ses échanges
- Harness de test sur port éphémère
*/

pub mod gateway_client;
pub mod payloads;
pub mod protocol;
pub mod test_utils;

pub use gateway_client::{GatewayClient, GatewayReply};
pub use payloads::SuraxitPayloadBuilder;
pub use protocol::{AlertReading, AlertType, EmergencyPacket};
pub use test_utils::TestHarness;
