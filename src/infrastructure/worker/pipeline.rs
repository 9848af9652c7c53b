//! Audio Pipeline Coordinator - 实时对话管线
//!
//! 每会话一个任务，严格串行地驱动 Listening -> Transcribing ->
//! Thinking -> Speaking 循环；唯一的并发例外是 Speaking 期间的
//! 打断检测（barge-in）。所有状态迁移先写账本、后生效。
//!
//! 阻塞点（提供商流、媒体帧、退避睡眠）全部受三个信号守护：
//! 取消令牌（forceEnd/活动取消）、挂断令牌、阶段超时。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AudioFrame, CallHandle, ChatTurn, ConversationContext, EventKind, LedgerPort, LedgerScope,
    LlmPort, MediaError, ProviderError, RecordingSinkPort, SpeechRequest, SttPort, TtsPort,
    TurnRecording, Utterance,
};
use crate::config::PipelineSettings;
use crate::domain::session::{PipelineState, Session, SessionOutcome, Speaker, Turn};
use crate::domain::AgentProfile;

/// 管线运行参数（由 PipelineSettings 换算）
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 话音结束判定的静音时长
    pub silence: Duration,
    /// 话音/打断能量阈值（i16 RMS）
    pub barge_in_rms: f64,
    /// 单次提供商调用的超时
    pub stage_timeout: Duration,
    /// 单次提供商调用的最大重试次数
    pub provider_max_retries: u32,
    /// 提供商重试退避基准
    pub provider_backoff: Duration,
    /// 会话空闲超时
    pub idle_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            silence: Duration::from_millis(settings.silence_ms),
            barge_in_rms: settings.barge_in_rms,
            stage_timeout: Duration::from_secs(settings.stage_timeout_secs),
            provider_max_retries: settings.provider_max_retries,
            provider_backoff: Duration::from_millis(settings.provider_backoff_ms),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
        }
    }
}

/// 管线外部依赖（提供商 + 账本 + 录音）
#[derive(Clone)]
pub struct PipelineDeps {
    pub stt: Arc<dyn SttPort>,
    pub llm: Arc<dyn LlmPort>,
    pub tts: Arc<dyn TtsPort>,
    pub ledger: Arc<dyn LedgerPort>,
    pub recording: Option<Arc<dyn RecordingSinkPort>>,
}

/// 阶段退出原因（映射为会话终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageExit {
    Hangup,
    Cancelled,
    MediaClosed,
    IdleTimeout,
    ProviderExhausted,
    Ledger,
}

impl StageExit {
    fn into_outcome(self) -> SessionOutcome {
        match self {
            StageExit::Hangup => SessionOutcome::Completed,
            StageExit::Cancelled => SessionOutcome::Cancelled,
            StageExit::MediaClosed => SessionOutcome::MediaLost,
            StageExit::IdleTimeout => SessionOutcome::IdleTimeout,
            StageExit::ProviderExhausted => SessionOutcome::ProviderFailure,
            StageExit::Ledger => SessionOutcome::LedgerFailure,
        }
    }
}

/// 一次提供商调用的失败分类
enum TryError {
    /// 瞬时错误（超时/网络/5xx），按退避重试
    Transient(ProviderError),
    /// 直接退出本会话
    Exit(StageExit),
}

fn classify(error: ProviderError) -> TryError {
    if error.is_transient() {
        TryError::Transient(error)
    } else {
        TryError::Exit(StageExit::ProviderExhausted)
    }
}

/// 把缓冲文本的第一个完整句子取出（用于逐句合成）
fn take_first_sentence(buffer: &mut String) -> Option<String> {
    let boundary = buffer
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
        .map(|(i, c)| i + c.len_utf8())?;
    let rest = buffer.split_off(boundary);
    let sentence = std::mem::replace(buffer, rest);
    Some(sentence)
}

/// 把回复文本切成合成段
fn split_sentences(text: &str) -> Vec<String> {
    let mut buffer = text.to_string();
    let mut segments = Vec::new();
    while let Some(sentence) = take_first_sentence(&mut buffer) {
        let trimmed = sentence.trim().to_string();
        if !trimmed.is_empty() {
            segments.push(trimmed);
        }
    }
    let tail = buffer.trim();
    if !tail.is_empty() {
        segments.push(tail.to_string());
    }
    segments
}

/// 实时对话管线协调器
pub struct PipelineCoordinator {
    session: Session,
    handle: CallHandle,
    agent: AgentProfile,
    deps: PipelineDeps,
    config: PipelineConfig,
    /// forceEnd / 活动取消
    cancel: CancellationToken,
    /// 对话历史（LLM 上下文）
    history: Vec<ChatTurn>,
    /// 已提交轮次数（录音命名）
    turn_index: usize,
}

impl PipelineCoordinator {
    pub fn new(
        session: Session,
        handle: CallHandle,
        agent: AgentProfile,
        deps: PipelineDeps,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            handle,
            agent,
            deps,
            config,
            cancel,
            history: Vec::new(),
            turn_index: 0,
        }
    }

    /// 驱动管线直到退出，返回最终聚合与终态
    pub async fn run(mut self) -> (Session, SessionOutcome) {
        let session_id = self.session.id();
        // drive 的主循环只会以 StageExit 结束
        let exit = self.drive().await.err().unwrap_or(StageExit::Hangup);
        let outcome = exit.into_outcome();
        tracing::info!(
            session_id = %session_id,
            state = %self.session.state().as_str(),
            outcome = %outcome.as_str(),
            turns = self.session.turns().len(),
            "Pipeline finished"
        );
        (self.session, outcome)
    }

    async fn drive(&mut self) -> Result<(), StageExit> {
        // 开场白：agent 先开口
        if let Some(first) = self.agent.first_message.clone() {
            self.transition(PipelineState::Speaking).await?;
            let interrupted = self.stream_reply(&first).await?;
            if interrupted {
                self.transition(PipelineState::Interrupted).await?;
            }
            self.commit_turn(Speaker::Agent, &first, interrupted, None).await?;
            self.transition(PipelineState::Listening).await?;
        }

        loop {
            // Listening: 缓冲来电方音频直到静音边界
            let frames = self.listen().await?;

            self.transition(PipelineState::Transcribing).await?;
            let transcript = self.transcribe(&frames).await?;
            if transcript.trim().is_empty() {
                self.transition(PipelineState::Listening).await?;
                continue;
            }
            self.commit_turn(Speaker::Caller, &transcript, false, Some(&frames))
                .await?;

            self.transition(PipelineState::Thinking).await?;
            // think() 在首个可合成片段到达时迁移到 Speaking
            let reply = self.think().await?;
            if reply.trim().is_empty() {
                self.transition(PipelineState::Listening).await?;
                continue;
            }

            let interrupted = self.stream_reply(&reply).await?;
            if interrupted {
                self.transition(PipelineState::Interrupted).await?;
            }
            self.commit_turn(Speaker::Agent, &reply, interrupted, None).await?;
            self.transition(PipelineState::Listening).await?;
        }
    }

    /// 状态迁移：先写账本，成功后才生效（write-ahead）
    async fn transition(&mut self, to: PipelineState) -> Result<(), StageExit> {
        let from = self.session.state();
        if let Err(e) = self
            .deps
            .ledger
            .append(
                LedgerScope::Session(self.session.id()),
                EventKind::StateChanged { from, to },
            )
            .await
        {
            tracing::error!(
                session_id = %self.session.id(),
                error = %e,
                "Ledger append failed, escalating"
            );
            return Err(StageExit::Ledger);
        }
        self.session.transition(to).map_err(|e| {
            tracing::error!(session_id = %self.session.id(), error = %e, "Illegal transition");
            StageExit::MediaClosed
        })?;
        tracing::debug!(
            session_id = %self.session.id(),
            from = %from.as_str(),
            to = %to.as_str(),
            "Pipeline state changed"
        );
        Ok(())
    }

    /// 提交一轮发言：账本先行，然后聚合、历史、录音
    async fn commit_turn(
        &mut self,
        speaker: Speaker,
        text: &str,
        interrupted: bool,
        audio: Option<&[AudioFrame]>,
    ) -> Result<(), StageExit> {
        let mut turn = Turn::new(speaker, text);
        if interrupted {
            turn = turn.interrupted();
        }

        self.deps
            .ledger
            .append(
                LedgerScope::Session(self.session.id()),
                EventKind::TurnCommitted { turn: turn.clone() },
            )
            .await
            .map_err(|e| {
                tracing::error!(session_id = %self.session.id(), error = %e, "Ledger append failed");
                StageExit::Ledger
            })?;

        self.session
            .push_turn(turn)
            .map_err(|_| StageExit::MediaClosed)?;
        self.history.push(ChatTurn {
            speaker,
            text: text.to_string(),
        });

        // 录音外发：失败只记日志，不影响通话
        if let (Some(sink), Some(frames)) = (&self.deps.recording, audio) {
            let mut pcm = Vec::new();
            for frame in frames {
                pcm.extend_from_slice(&frame.to_le_bytes());
            }
            let recording = TurnRecording {
                session_id: self.session.id(),
                turn_index: self.turn_index,
                speaker,
                audio: pcm,
                sample_rate: self.handle.sample_rate,
            };
            if let Err(e) = sink.store_turn(recording).await {
                tracing::warn!(
                    session_id = %self.session.id(),
                    error = %e,
                    "Turn recording failed"
                );
            }
        }
        self.turn_index += 1;
        Ok(())
    }

    /// Listening 阶段：收帧直到话音后出现足够长的静音
    async fn listen(&mut self) -> Result<Vec<AudioFrame>, StageExit> {
        let frame_ms = self.frame_duration();
        let cancel = self.cancel.clone();
        let hangup = self.handle.hangup.clone();
        let idle_deadline = Instant::now() + self.config.idle_timeout;

        let mut frames = Vec::new();
        let mut speech_started = false;
        let mut silence = Duration::ZERO;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StageExit::Cancelled),
                _ = hangup.cancelled() => return Err(StageExit::Hangup),
                _ = tokio::time::sleep_until(idle_deadline), if !speech_started => {
                    return Err(StageExit::IdleTimeout);
                }
                maybe = self.handle.caller_audio.recv() => {
                    let Some(frame) = maybe else {
                        tracing::warn!(
                            session_id = %self.session.id(),
                            error = %MediaError::StreamClosed,
                            "Caller frame stream lost"
                        );
                        return Err(StageExit::MediaClosed);
                    };
                    if frame.rms() >= self.config.barge_in_rms {
                        speech_started = true;
                        silence = Duration::ZERO;
                    } else if speech_started {
                        silence += frame_ms;
                    }
                    frames.push(frame);
                    if speech_started && silence >= self.config.silence {
                        return Ok(frames);
                    }
                }
            }
        }
    }

    /// Transcribing 阶段：带重试地取回定稿转写
    async fn transcribe(&mut self, frames: &[AudioFrame]) -> Result<String, StageExit> {
        let utterance = Utterance {
            frames: frames.to_vec(),
            sample_rate: self.handle.sample_rate,
            language: self.agent.language.clone(),
        };

        let mut attempt = 0u32;
        loop {
            match self.try_transcribe(utterance.clone()).await {
                Ok(transcript) => return Ok(transcript),
                Err(TryError::Exit(exit)) => return Err(exit),
                Err(TryError::Transient(e)) => {
                    attempt += 1;
                    if attempt > self.config.provider_max_retries {
                        tracing::warn!(
                            session_id = %self.session.id(),
                            error = %e,
                            attempts = attempt,
                            "STT retries exhausted"
                        );
                        return Err(StageExit::ProviderExhausted);
                    }
                    self.retry_backoff("transcribe", attempt, &e).await?;
                }
            }
        }
    }

    async fn try_transcribe(&self, utterance: Utterance) -> Result<String, TryError> {
        let cancel = self.cancel.clone();
        let hangup = self.handle.hangup.clone();
        let deadline = Instant::now() + self.config.stage_timeout;
        let stt = self.deps.stt.clone();

        let mut stream = guarded(&cancel, &hangup, deadline, stt.transcribe(utterance))
            .await?
            .map_err(classify)?;

        let mut transcript = String::new();
        loop {
            match guarded(&cancel, &hangup, deadline, stream.next()).await? {
                Some(Ok(part)) => {
                    transcript.push_str(&part.text);
                    if part.is_final {
                        return Ok(transcript);
                    }
                }
                Some(Err(e)) => return Err(classify(e)),
                None => return Ok(transcript),
            }
        }
    }

    /// Thinking 阶段：流式取回补全；首个可合成片段到达即迁移 Speaking
    async fn think(&mut self) -> Result<String, StageExit> {
        let context = ConversationContext {
            instructions: self.agent.instructions.clone(),
            history: self.history.clone(),
            language: self.agent.language.clone(),
        };

        let mut attempt = 0u32;
        loop {
            match self.try_think(context.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(TryError::Exit(exit)) => return Err(exit),
                Err(TryError::Transient(e)) => {
                    attempt += 1;
                    if attempt > self.config.provider_max_retries {
                        tracing::warn!(
                            session_id = %self.session.id(),
                            error = %e,
                            attempts = attempt,
                            "LLM retries exhausted"
                        );
                        return Err(StageExit::ProviderExhausted);
                    }
                    self.retry_backoff("think", attempt, &e).await?;
                }
            }
        }
    }

    async fn try_think(&mut self, context: ConversationContext) -> Result<String, TryError> {
        let cancel = self.cancel.clone();
        let hangup = self.handle.hangup.clone();
        let deadline = Instant::now() + self.config.stage_timeout;
        let llm = self.deps.llm.clone();

        let mut stream = guarded(&cancel, &hangup, deadline, llm.complete(context))
            .await?
            .map_err(classify)?;

        let mut reply = String::new();
        let mut speaking = false;
        loop {
            match guarded(&cancel, &hangup, deadline, stream.next()).await? {
                Some(Ok(chunk)) => {
                    if !speaking && !chunk.text.trim().is_empty() {
                        // 首个可合成片段：进入 Speaking。
                        // 瞬时错误重试时可能已处于 Speaking，不重复迁移
                        if self.session.state() == PipelineState::Thinking {
                            self.transition(PipelineState::Speaking)
                                .await
                                .map_err(TryError::Exit)?;
                        }
                        speaking = true;
                    }
                    reply.push_str(&chunk.text);
                    if chunk.is_final {
                        return Ok(reply);
                    }
                }
                Some(Err(e)) => return Err(classify(e)),
                None => return Ok(reply),
            }
        }
    }

    /// Speaking 阶段：逐句合成播放，并发监听打断
    ///
    /// 返回是否被打断；打断时在途合成流被丢弃（取消），
    /// 被打断轮不再发出任何合成帧
    async fn stream_reply(&mut self, reply: &str) -> Result<bool, StageExit> {
        let mut segments: VecDeque<String> = split_sentences(reply).into();

        while let Some(segment) = segments.pop_front() {
            if self.stream_segment(&segment).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 合成并播放一个句段；返回是否被打断
    async fn stream_segment(&mut self, segment: &str) -> Result<bool, StageExit> {
        let mut attempt = 0u32;
        loop {
            match self.try_stream_segment(segment).await {
                Ok(interrupted) => return Ok(interrupted),
                Err(TryError::Exit(exit)) => return Err(exit),
                Err(TryError::Transient(e)) => {
                    attempt += 1;
                    if attempt > self.config.provider_max_retries {
                        tracing::warn!(
                            session_id = %self.session.id(),
                            error = %e,
                            attempts = attempt,
                            "TTS retries exhausted"
                        );
                        return Err(StageExit::ProviderExhausted);
                    }
                    self.retry_backoff("synthesize", attempt, &e).await?;
                }
            }
        }
    }

    async fn try_stream_segment(&mut self, segment: &str) -> Result<bool, TryError> {
        let cancel = self.cancel.clone();
        let hangup = self.handle.hangup.clone();
        let deadline = Instant::now() + self.config.stage_timeout;
        let tts = self.deps.tts.clone();
        let playback = self.handle.playback.clone();
        let barge_in_rms = self.config.barge_in_rms;

        let request = SpeechRequest {
            text: segment.to_string(),
            voice_id: self.agent.voice_id.clone(),
            sample_rate: self.handle.sample_rate,
        };
        let mut synth = guarded(&cancel, &hangup, deadline, tts.synthesize(request))
            .await?
            .map_err(classify)?;

        let caller = &mut self.handle.caller_audio;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TryError::Exit(StageExit::Cancelled)),
                _ = hangup.cancelled() => return Err(TryError::Exit(StageExit::Hangup)),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(TryError::Transient(ProviderError::Timeout));
                }
                maybe = caller.recv() => {
                    match maybe {
                        // 打断：丢弃在途合成流，立即停止发帧
                        Some(frame) if frame.rms() >= barge_in_rms => {
                            drop(synth);
                            return Ok(true);
                        }
                        Some(_) => {} // 低能量帧不构成打断
                        None => return Err(TryError::Exit(StageExit::MediaClosed)),
                    }
                }
                frame = synth.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if playback.send(frame).await.is_err() {
                                return Err(TryError::Exit(StageExit::MediaClosed));
                            }
                        }
                        Some(Err(e)) => return Err(classify(e)),
                        None => return Ok(false), // 句段播放完毕
                    }
                }
            }
        }
    }

    /// 受守护的重试退避睡眠
    async fn retry_backoff(
        &self,
        stage: &str,
        attempt: u32,
        error: &ProviderError,
    ) -> Result<(), StageExit> {
        let backoff = self.config.provider_backoff * 2u32.saturating_pow(attempt - 1);
        tracing::debug!(
            session_id = %self.session.id(),
            stage = stage,
            attempt = attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Retrying provider call"
        );
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageExit::Cancelled),
            _ = self.handle.hangup.cancelled() => Err(StageExit::Hangup),
            _ = tokio::time::sleep(backoff) => Ok(()),
        }
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_millis(
            (self.handle.frame_samples as u64 * 1_000) / self.handle.sample_rate.max(1) as u64,
        )
    }
}

/// 给任意等待点加上取消/挂断/超时三重守护
async fn guarded<F, T>(
    cancel: &CancellationToken,
    hangup: &CancellationToken,
    deadline: Instant,
    fut: F,
) -> Result<T, TryError>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TryError::Exit(StageExit::Cancelled)),
        _ = hangup.cancelled() => Err(TryError::Exit(StageExit::Hangup)),
        _ = tokio::time::sleep_until(deadline) => Err(TryError::Transient(ProviderError::Timeout)),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{LedgerScope, PlaceCallRequest, TelephonyPort};
    use crate::domain::campaign::PhoneNumber;
    use crate::infrastructure::adapters::{
        SimCallDriver, SimLlmClient, SimSttClient, SimTelephonyGateway, SimTtsClient,
    };
    use crate::infrastructure::memory::InMemoryLedger;
    use tokio::task::JoinHandle;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            silence: Duration::from_millis(40),
            barge_in_rms: 1_000.0,
            stage_timeout: Duration::from_secs(5),
            provider_max_retries: 1,
            provider_backoff: Duration::from_millis(5),
            idle_timeout: Duration::from_millis(300),
        }
    }

    struct Harness {
        stt: Arc<SimSttClient>,
        llm: Arc<SimLlmClient>,
        ledger: Arc<InMemoryLedger>,
        session_scope: LedgerScope,
        driver: SimCallDriver,
        cancel: CancellationToken,
        task: JoinHandle<(Session, SessionOutcome)>,
    }

    async fn spawn_pipeline(agent: AgentProfile, config: PipelineConfig) -> Harness {
        let gateway = SimTelephonyGateway::with_defaults();
        let handle = gateway
            .place_call(PlaceCallRequest::new(
                PhoneNumber::new("+919148227303").unwrap(),
            ))
            .await
            .unwrap();
        let driver = gateway.take_driver(&handle.call_id).unwrap();

        let stt = Arc::new(SimSttClient::with_defaults());
        let llm = Arc::new(SimLlmClient::with_defaults());
        let ledger = Arc::new(InMemoryLedger::new());
        let deps = PipelineDeps {
            stt: stt.clone(),
            llm: llm.clone(),
            tts: Arc::new(SimTtsClient::with_defaults()),
            ledger: ledger.clone(),
            recording: None,
        };

        let cancel = CancellationToken::new();
        let session = Session::new(None);
        let session_scope = LedgerScope::Session(session.id());
        let coordinator =
            PipelineCoordinator::new(session, handle, agent, deps, config, cancel.clone());
        let task = tokio::spawn(coordinator.run());

        Harness {
            stt,
            llm,
            ledger,
            session_scope,
            driver,
            cancel,
            task,
        }
    }

    fn loud_frame() -> AudioFrame {
        AudioFrame::new(vec![4_000; 320])
    }

    async fn send_utterance(driver: &SimCallDriver) {
        for _ in 0..3 {
            driver.caller_tx.send(loud_frame()).await.unwrap();
        }
        // 静音尾（40ms 阈值 = 2 帧 @20ms）
        for _ in 0..3 {
            driver.caller_tx.send(AudioFrame::silence(320)).await.unwrap();
        }
    }

    /// 轮询账本直到出现指定迁移
    async fn wait_for_transition(
        ledger: &InMemoryLedger,
        scope: LedgerScope,
        to: PipelineState,
    ) -> bool {
        for _ in 0..200 {
            let events = ledger.replay(scope).await.unwrap();
            let found = events.iter().any(|e| {
                matches!(e.kind, EventKind::StateChanged { to: t, .. } if t == to)
            });
            if found {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// 轮询账本直到提交了足够多的轮次（挂断前的同步点）
    async fn wait_for_turns(ledger: &InMemoryLedger, scope: LedgerScope, count: usize) -> bool {
        for _ in 0..400 {
            let events = ledger.replay(scope).await.unwrap();
            let turns = events
                .iter()
                .filter(|e| matches!(e.kind, EventKind::TurnCommitted { .. }))
                .count();
            if turns >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_idle_timeout_without_frames() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        let (session, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::IdleTimeout);
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn test_hangup_completes_session() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        harness.driver.hangup.cancel();
        let (_, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_cancel_token_forces_cancelled() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        harness.cancel.cancel();
        let (_, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_full_turn_cycle() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        harness.stt.push_transcript("what are your hours");
        harness.llm.push_reply("We are open all day.");

        send_utterance(&harness.driver).await;

        // 等 agent 回复播放完（回复 5 词 * 2 帧）
        let mut driver = harness.driver;
        let mut played = 0;
        while played < 10 {
            match tokio::time::timeout(Duration::from_secs(2), driver.played_rx.recv()).await {
                Ok(Some(_)) => played += 1,
                _ => break,
            }
        }
        assert!(played > 0, "agent audio should have been played");

        // 两轮（caller + agent）都提交后再挂断
        assert!(wait_for_turns(&harness.ledger, harness.session_scope, 2).await);

        driver.hangup.cancel();
        let (session, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed);

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, Speaker::Caller);
        assert_eq!(turns[0].transcript, "what are your hours");
        assert_eq!(turns[1].speaker, Speaker::Agent);
        assert!(!turns[1].interrupted);
    }

    #[tokio::test]
    async fn test_barge_in_interrupts_synthesis() {
        let mut config = test_config();
        // 留出打断与断言的时间窗口
        config.stage_timeout = Duration::from_secs(10);
        config.idle_timeout = Duration::from_secs(2);
        let harness = spawn_pipeline(AgentProfile::default(), config).await;
        harness.stt.push_transcript("tell me everything");
        harness
            .llm
            .push_reply("This is a very long reply. It goes on and on. And on some more.");

        send_utterance(&harness.driver).await;

        // 等第一帧合成音频，然后打断
        let mut driver = harness.driver;
        let first = tokio::time::timeout(Duration::from_secs(2), driver.played_rx.recv())
            .await
            .expect("synthesis should start")
            .expect("stream open");
        assert!(!first.samples.is_empty());

        driver.caller_tx.send(loud_frame()).await.unwrap();

        // 账本中必须出现 Speaking -> Interrupted
        let interrupted = wait_for_transition(
            &harness.ledger,
            harness.session_scope,
            PipelineState::Interrupted,
        )
        .await;
        assert!(interrupted, "pipeline must transition to Interrupted");
        assert!(wait_for_turns(&harness.ledger, harness.session_scope, 2).await);

        driver.hangup.cancel();
        let (session, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed);

        let agent_turn = session
            .turns()
            .iter()
            .find(|t| t.speaker == Speaker::Agent)
            .expect("agent turn committed");
        assert!(agent_turn.interrupted);

        // 被打断后不再有新的合成帧：清空通道后保持安静
        while driver.played_rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(driver.played_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stt_retry_exhaustion_is_provider_failure() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        // max_retries = 1 → 首次 + 重试各吃一个错误
        harness.stt.push_error(ProviderError::Timeout);
        harness.stt.push_error(ProviderError::Network("reset".into()));

        send_utterance(&harness.driver).await;

        let (_, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::ProviderFailure);
    }

    #[tokio::test]
    async fn test_transient_stt_error_recovers() {
        let harness = spawn_pipeline(AgentProfile::default(), test_config()).await;
        harness.stt.push_error(ProviderError::Timeout);
        harness.stt.push_transcript("second try works");

        send_utterance(&harness.driver).await;

        // 等 caller 轮提交后挂断
        assert!(wait_for_turns(&harness.ledger, harness.session_scope, 1).await);
        harness.driver.hangup.cancel();
        let (session, outcome) = harness.task.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed);
        assert!(session
            .turns()
            .iter()
            .any(|t| t.transcript == "second try works"));
    }

    #[tokio::test]
    async fn test_greeting_spoken_first() {
        let agent = AgentProfile {
            first_message: Some("Hello from the agent.".to_string()),
            ..Default::default()
        };
        let harness = spawn_pipeline(agent, test_config()).await;

        let mut driver = harness.driver;
        let first = tokio::time::timeout(Duration::from_secs(2), driver.played_rx.recv())
            .await
            .expect("greeting should be synthesized")
            .expect("stream open");
        assert!(!first.samples.is_empty());

        // 开场白轮提交后再挂断
        assert!(wait_for_turns(&harness.ledger, harness.session_scope, 1).await);

        driver.hangup.cancel();
        let (session, _) = harness.task.await.unwrap();
        assert_eq!(session.turns()[0].speaker, Speaker::Agent);
        assert_eq!(session.turns()[0].transcript, "Hello from the agent.");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two! Three?"),
            vec!["One.", "Two!", "Three?"]
        );
        assert_eq!(split_sentences("no terminator"), vec!["no terminator"]);
        assert_eq!(
            split_sentences("Head. trailing tail"),
            vec!["Head.", "trailing tail"]
        );
        assert!(split_sentences("   ").is_empty());
    }
}
