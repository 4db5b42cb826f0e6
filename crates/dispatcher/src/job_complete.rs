//! 作业执行完成后的触发器推进
//!
//! 无论状态更新是否成功，作业锁与触发器锁都会被释放。

use std::sync::Arc;

use jobstore_core::JobStoreResult;
use jobstore_domain::{
    CompletedExecutionInstruction, JobRecord, LockType, Repositories, TriggerRecord, TriggerState,
};
use tracing::{debug, error, info};

use crate::lock_manager::LockManager;
use crate::persister::TriggerPersister;
use crate::trigger_state_manager::TriggerStateManager;

pub struct JobCompleteHandler {
    repos: Repositories,
    lock_manager: Arc<LockManager>,
    state_manager: Arc<TriggerStateManager>,
    persister: Arc<TriggerPersister>,
}

impl JobCompleteHandler {
    pub fn new(
        repos: Repositories,
        lock_manager: Arc<LockManager>,
        state_manager: Arc<TriggerStateManager>,
        persister: Arc<TriggerPersister>,
    ) -> Self {
        Self {
            repos,
            lock_manager,
            state_manager,
            persister,
        }
    }

    pub async fn triggered_job_complete(
        &self,
        trigger: &TriggerRecord,
        job: &JobRecord,
        instruction: CompletedExecutionInstruction,
    ) -> JobStoreResult<()> {
        debug!(
            "作业 {} 执行完成，触发器 {} 指令 {:?}",
            job.key, trigger.key, instruction
        );

        let applied = self.apply(trigger, job, instruction).await;
        if let Err(e) = &applied {
            error!("推进触发器 {} 状态失败: {}", trigger.key, e);
        }

        let job_released = if job.concurrent_execution_disallowed {
            self.release_job(job).await
        } else {
            Ok(())
        };
        let trigger_released = self.lock_manager.unlock(LockType::Trigger, &trigger.key).await;

        applied?;
        job_released?;
        trigger_released
    }

    async fn apply(
        &self,
        trigger: &TriggerRecord,
        job: &JobRecord,
        instruction: CompletedExecutionInstruction,
    ) -> JobStoreResult<()> {
        match instruction {
            CompletedExecutionInstruction::Noop | CompletedExecutionInstruction::ReExecuteJob => {
                self.advance(trigger).await
            }
            CompletedExecutionInstruction::SetTriggerComplete => {
                self.set_state(trigger, TriggerState::Complete).await
            }
            CompletedExecutionInstruction::DeleteTrigger => {
                self.persister.remove_trigger(&trigger.key).await?;
                Ok(())
            }
            CompletedExecutionInstruction::SetTriggerError => {
                info!("触发器 {} 进入错误状态", trigger.key);
                self.set_state(trigger, TriggerState::Error).await
            }
            CompletedExecutionInstruction::SetAllJobTriggersComplete => {
                for sibling in self.repos.triggers.find_by_job(&job.key).await? {
                    self.set_state(&sibling, TriggerState::Complete).await?;
                }
                Ok(())
            }
            CompletedExecutionInstruction::SetAllJobTriggersError => {
                info!("作业 {} 的全部触发器进入错误状态", job.key);
                for sibling in self.repos.triggers.find_by_job(&job.key).await? {
                    self.set_state(&sibling, TriggerState::Error).await?;
                }
                Ok(())
            }
        }
    }

    /// 调度耗尽则删除触发器，否则回到 WAITING（执行期间被暂停的保持 PAUSED）
    async fn advance(&self, trigger: &TriggerRecord) -> JobStoreResult<()> {
        let Some(mut stored) = self.repos.triggers.find(&trigger.key).await? else {
            return Ok(());
        };

        if stored.state == TriggerState::Acquired
            && stored.fire_instance_id != trigger.fire_instance_id
        {
            debug!("触发器 {} 已被其他节点重新获取，保持不变", stored.key);
            return Ok(());
        }

        if stored.next_fire_time.is_none() {
            debug!("触发器 {} 已没有后续触发，删除", stored.key);
            self.persister.remove_trigger(&stored.key).await?;
            return Ok(());
        }

        let paused = stored.state.is_paused() || self.state_manager.is_group_paused(&stored).await?;
        stored.state = if paused {
            TriggerState::Paused
        } else {
            TriggerState::Waiting
        };
        stored.fire_instance_id = None;
        self.repos.triggers.save(&stored).await
    }

    async fn set_state(&self, trigger: &TriggerRecord, state: TriggerState) -> JobStoreResult<()> {
        let Some(mut stored) = self.repos.triggers.find(&trigger.key).await? else {
            return Ok(());
        };
        stored.state = state;
        stored.fire_instance_id = None;
        self.repos.triggers.save(&stored).await
    }

    /// 先释放作业锁再解除阻塞，解除阻塞的触发器不会再撞上本节点的作业锁
    async fn release_job(&self, job: &JobRecord) -> JobStoreResult<()> {
        let unlocked = self.lock_manager.unlock(LockType::Job, &job.key).await;
        let unblocked = self.state_manager.unblock_siblings(&job.key).await;
        unlocked?;
        unblocked
    }
}
