//! Query pools and indirect command signatures.

use crate::error::{RhiError, RhiResult};
use crate::handle::{CommandSignatureHandle, QueryPoolHandle, QueueHandle};
use crate::types::{CommandSignatureDesc, IndirectArgumentType, QueryPoolDesc, QueryType};

use super::objects::{CommandSignatureObject, QueryPoolObject};
use super::Device;

impl Device {
    /// Create a pool of `desc.query_count` queries.
    pub fn add_query_pool(&self, desc: &QueryPoolDesc) -> RhiResult<QueryPoolHandle> {
        if desc.query_count == 0 {
            return Err(RhiError::InvalidParameter("query pool with zero queries".into()));
        }
        let caps = self.capabilities();
        let supported = match desc.query_type {
            QueryType::Timestamp => caps.timestamp_queries,
            QueryType::Occlusion => caps.occlusion_queries,
            QueryType::PipelineStatistics => caps.pipeline_statistics_queries,
        };
        if !supported {
            return Err(RhiError::FeatureNotSupported(format!(
                "{:?} queries",
                desc.query_type
            )));
        }
        if desc.node_index >= caps.gpu_count {
            return Err(RhiError::InvalidParameter(format!(
                "node index {} with {} GPUs",
                desc.node_index, caps.gpu_count
            )));
        }
        let handle = self.objects.write().query_pools.insert(QueryPoolObject { desc: *desc });
        log::trace!(
            "Added {:?} query pool {:?} ({} queries)",
            desc.query_type,
            handle,
            desc.query_count
        );
        Ok(handle)
    }

    /// Destroy a query pool.
    pub fn remove_query_pool(&self, pool: QueryPoolHandle) -> RhiResult<()> {
        self.objects.write().query_pools.remove(pool)?;
        Ok(())
    }

    /// Ticks per second of timestamps written on `queue`.
    pub fn get_timestamp_frequency(&self, queue: QueueHandle) -> RhiResult<f64> {
        self.objects.read().queues.get(queue)?;
        Ok(self.backend.timestamp_frequency())
    }

    /// Create the layout of one indirect command.
    ///
    /// The last argument must issue the work; the ones before it update
    /// state. The byte stride of a command is the sum of its argument sizes.
    pub fn add_indirect_command_signature(&self, desc: &CommandSignatureDesc) -> RhiResult<CommandSignatureHandle> {
        let Some(last) = desc.arg_descs.last() else {
            return Err(RhiError::InvalidParameter("command signature without arguments".into()));
        };
        if !last.arg_type.is_action() {
            return Err(RhiError::InvalidParameter(format!(
                "command signature ends with {:?}, expected a draw or dispatch",
                last.arg_type
            )));
        }
        if desc.arg_descs[..desc.arg_descs.len() - 1]
            .iter()
            .any(|arg| arg.arg_type.is_action())
        {
            return Err(RhiError::InvalidParameter(
                "command signature issues more than one action".into(),
            ));
        }

        let mut objects = self.objects.write();
        objects.cmd_pools.get(desc.cmd_pool)?;
        let root = match desc.root_signature {
            Some(handle) => Some(objects.root_signatures.get(handle)?),
            None => None,
        };
        for arg in &desc.arg_descs {
            if arg.arg_type != IndirectArgumentType::Constant {
                continue;
            }
            let Some(root) = root else {
                return Err(RhiError::InvalidParameter(
                    "constant arguments need a root signature".into(),
                ));
            };
            let name = arg.name.as_deref().unwrap_or_default();
            let Some(constant) = root.root_constants.iter().find(|c| c.name == name) else {
                return Err(RhiError::BindingMismatch(format!(
                    "no root constant '{name}' for indirect argument"
                )));
            };
            if arg.count == 0 || u64::from(arg.count) * 4 > u64::from(constant.size) {
                return Err(RhiError::InvalidParameter(format!(
                    "{} values written to root constant '{name}' of {} bytes",
                    arg.count, constant.size
                )));
            }
        }

        let stride = desc
            .arg_descs
            .iter()
            .map(|arg| arg.arg_type.stride(arg.count))
            .sum();
        if let Some(root_signature) = desc.root_signature {
            objects.root_signatures.retain(root_signature)?;
        }
        let handle = objects.command_signatures.insert(CommandSignatureObject {
            root_signature: desc.root_signature,
            stride,
            action: last.arg_type,
        });
        log::trace!(
            "Added command signature {:?} ({:?}, stride {stride})",
            handle,
            last.arg_type
        );
        Ok(handle)
    }

    /// Destroy a command signature.
    pub fn remove_indirect_command_signature(&self, signature: CommandSignatureHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.command_signatures.remove(signature)?;
        if let Some(root_signature) = removed.root_signature {
            objects.root_signatures.release(root_signature);
        }
        Ok(())
    }

    /// Byte stride of one command laid out by `signature`.
    pub fn command_signature_stride(&self, signature: CommandSignatureHandle) -> RhiResult<u32> {
        Ok(self.objects.read().command_signatures.get(signature)?.stride)
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::{Renderer, RendererDesc};
    use crate::types::{
        CmdPoolDesc, CommandSignatureDesc, IndirectArgumentDescriptor, IndirectArgumentType,
        QueryPoolDesc, QueryType, QueueDesc, QueueType,
    };

    #[test]
    fn test_query_pool_requires_queries() {
        let renderer = Renderer::new("query-test", &RendererDesc::default()).unwrap();
        let desc = QueryPoolDesc {
            query_type: QueryType::Timestamp,
            query_count: 0,
            node_index: 0,
        };
        assert!(renderer.add_query_pool(&desc).is_err());
        let pool = renderer
            .add_query_pool(&QueryPoolDesc { query_count: 4, ..desc })
            .unwrap();
        renderer.remove_query_pool(pool).unwrap();

        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        assert!(renderer.get_timestamp_frequency(queue).unwrap() > 0.0);
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_command_signature_stride() {
        let renderer = Renderer::new("query-test", &RendererDesc::default()).unwrap();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue)).unwrap();

        let draw = CommandSignatureDesc {
            cmd_pool: pool,
            root_signature: None,
            arg_descs: vec![IndirectArgumentDescriptor::new(IndirectArgumentType::DrawIndex)],
        };
        let signature = renderer.add_indirect_command_signature(&draw).unwrap();
        assert_eq!(renderer.command_signature_stride(signature).unwrap(), 20);

        let trailing_state = CommandSignatureDesc {
            arg_descs: vec![
                IndirectArgumentDescriptor::new(IndirectArgumentType::Draw),
                IndirectArgumentDescriptor::new(IndirectArgumentType::VertexBuffer),
            ],
            ..draw.clone()
        };
        assert!(renderer.add_indirect_command_signature(&trailing_state).is_err());

        let unnamed_constant = CommandSignatureDesc {
            arg_descs: vec![
                IndirectArgumentDescriptor::new(IndirectArgumentType::Constant),
                IndirectArgumentDescriptor::new(IndirectArgumentType::Draw),
            ],
            ..draw
        };
        assert!(renderer.add_indirect_command_signature(&unnamed_constant).is_err());

        renderer.remove_indirect_command_signature(signature).unwrap();
        renderer.remove_cmd_pool(pool).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }
}
