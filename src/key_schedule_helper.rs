// Glue between the key schedule and the record pipelines.

use std::sync::Arc;

use crate::cipher::CipherEndpointSpec;
use crate::cipher_suite::{CipherSuite, CipherSuiteParts};
use crate::crypto::{next_nonce_seed, Crypto};
use crate::errors::Result;
use crate::handshake::ProtocolVersion;
use crate::key_schedule::key_block;
use crate::record_layer::{InboundRecords, OutboundRecords};
use crate::security_params::Entity;

pub struct KeyScheduleHelper {}

impl KeyScheduleHelper {
    /// Expands the master secret into traffic keys and stages a cipher on
    /// each pipeline. The keys only become active when the corresponding
    /// ChangeCipherSpec is received/emitted.
    pub fn stage_ciphers(
        crypto: &Arc<dyn Crypto>,
        entity: Entity,
        version: ProtocolVersion,
        suite: CipherSuite,
        parts: &CipherSuiteParts,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
        inbound: &mut InboundRecords,
        outbound: &mut OutboundRecords,
    ) -> Result<()> {
        let block = key_block(
            crypto.as_ref(),
            version,
            parts.prf_hash,
            master_secret,
            client_random,
            server_random,
            parts.bulk.mac_key_length,
            parts.bulk.key_length,
            parts.bulk.fixed_iv_length,
        );

        let client_spec = CipherEndpointSpec::new(
            crypto.create_aead(
                suite,
                &block.client_write_key,
                &block.client_write_iv,
                &block.client_write_mac_key,
            )?,
            block.client_write_iv.clone(),
            crypto.create_nonce_generator(suite, next_nonce_seed())?,
        );

        let server_spec = CipherEndpointSpec::new(
            crypto.create_aead(
                suite,
                &block.server_write_key,
                &block.server_write_iv,
                &block.server_write_mac_key,
            )?,
            block.server_write_iv.clone(),
            crypto.create_nonce_generator(suite, next_nonce_seed())?,
        );

        match entity {
            Entity::Client => {
                outbound.set_pending_cipher(client_spec, parts.bulk.aead);
                inbound.set_pending_cipher(server_spec);
            }
            Entity::Server => {
                outbound.set_pending_cipher(server_spec, parts.bulk.aead);
                inbound.set_pending_cipher(client_spec);
            }
        }

        Ok(())
    }
}
